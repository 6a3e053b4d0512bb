// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/placement.rs - 锚点周围的区域标记放置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::anchor::{PlacementSink, Vec3};

#[derive(Error, Debug, PartialEq)]
pub enum ZoneLayoutError {
  #[error("区域名称不能为空")]
  EmptyName,
  #[error("区域 '{zone}' 的偏移量无效: {offset:?}")]
  InvalidOffset { zone: String, offset: Vec3 },
}

/// 车辆各区域相对锚点的偏移量（米）
const DEFAULT_ZONE_OFFSETS: [(&str, [f32; 3]); 8] = [
  ("Motor", [0.0, 0.2, 0.4]),
  ("Steering", [0.3, 0.3, 0.8]),
  ("Exhaust", [-0.4, 0.0, 1.8]),
  ("Brakes", [0.2, -0.1, 0.6]),
  ("Transmission", [-0.3, 0.15, 0.5]),
  ("Suspension", [0.1, -0.2, 1.5]),
  ("Cooling", [0.0, 0.25, 0.2]),
  ("Battery", [-0.2, 0.1, 0.3]),
];

/// 区域名称到偏移量的映射，加载时校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, [f32; 3]>", into = "BTreeMap<String, [f32; 3]>")]
pub struct ZoneLayout {
  offsets: BTreeMap<String, Vec3>,
}

impl ZoneLayout {
  pub fn new<I, K>(entries: I) -> Result<Self, ZoneLayoutError>
  where
    I: IntoIterator<Item = (K, Vec3)>,
    K: Into<String>,
  {
    let mut offsets = BTreeMap::new();
    for (zone, offset) in entries {
      let zone = zone.into();
      if zone.trim().is_empty() {
        return Err(ZoneLayoutError::EmptyName);
      }
      if !offset.is_finite() {
        return Err(ZoneLayoutError::InvalidOffset { zone, offset });
      }
      offsets.insert(zone, offset);
    }
    Ok(Self { offsets })
  }

  pub fn offset(&self, zone: &str) -> Option<Vec3> {
    self.offsets.get(zone).copied()
  }

  pub fn zones(&self) -> impl Iterator<Item = (&str, Vec3)> {
    self.offsets.iter().map(|(k, v)| (k.as_str(), *v))
  }

  pub fn len(&self) -> usize {
    self.offsets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.offsets.is_empty()
  }
}

impl Default for ZoneLayout {
  fn default() -> Self {
    Self {
      offsets: DEFAULT_ZONE_OFFSETS
        .iter()
        .map(|(zone, offset)| (zone.to_string(), Vec3::from(*offset)))
        .collect(),
    }
  }
}

impl TryFrom<BTreeMap<String, [f32; 3]>> for ZoneLayout {
  type Error = ZoneLayoutError;

  fn try_from(map: BTreeMap<String, [f32; 3]>) -> Result<Self, Self::Error> {
    ZoneLayout::new(map.into_iter().map(|(k, v)| (k, Vec3::from(v))))
  }
}

impl From<ZoneLayout> for BTreeMap<String, [f32; 3]> {
  fn from(layout: ZoneLayout) -> Self {
    layout
      .offsets
      .into_iter()
      .map(|(k, v)| (k, [v.x, v.y, v.z]))
      .collect()
  }
}

/// 标记的稳定标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
  pub id: MarkerId,
  pub zone: String,
  pub position: Vec3,
}

/// 已放置标记的注册表，按标识查找
#[derive(Debug, Default)]
pub struct MarkerRegistry {
  markers: BTreeMap<MarkerId, Marker>,
  next_id: u32,
}

impl MarkerRegistry {
  pub fn insert(&mut self, zone: &str, position: Vec3) -> MarkerId {
    let id = MarkerId(self.next_id);
    self.next_id += 1;
    self.markers.insert(
      id,
      Marker {
        id,
        zone: zone.to_string(),
        position,
      },
    );
    id
  }

  pub fn get(&self, id: MarkerId) -> Option<&Marker> {
    self.markers.get(&id)
  }

  pub fn find_zone(&self, zone: &str) -> Option<&Marker> {
    self.markers.values().find(|m| m.zone == zone)
  }

  pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
    self.markers.remove(&id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Marker> {
    self.markers.values()
  }

  pub fn len(&self) -> usize {
    self.markers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.markers.is_empty()
  }
}

/// 锁定时在锚点周围按区域布局放置标记
#[derive(Debug, Default)]
pub struct ZoneMarkerPlacement {
  layout: ZoneLayout,
  registry: MarkerRegistry,
}

impl ZoneMarkerPlacement {
  pub fn new(layout: ZoneLayout) -> Self {
    Self {
      layout,
      registry: MarkerRegistry::default(),
    }
  }

  pub fn registry(&self) -> &MarkerRegistry {
    &self.registry
  }
}

impl PlacementSink for ZoneMarkerPlacement {
  type Handle = Vec<MarkerId>;

  fn place(&mut self, position: Vec3) -> Self::Handle {
    let ids: Vec<MarkerId> = self
      .layout
      .zones()
      .map(|(zone, offset)| {
        let at = position + offset;
        debug!("放置区域标记 {}: ({:.3}, {:.3}, {:.3})", zone, at.x, at.y, at.z);
        self.registry.insert(zone, at)
      })
      .collect();
    info!("共放置 {} 个区域标记", ids.len());
    ids
  }
}

impl<S: PlacementSink + ?Sized> PlacementSink for Box<S> {
  type Handle = S::Handle;

  fn place(&mut self, position: Vec3) -> Self::Handle {
    (**self).place(position)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_layout_has_vehicle_zones() {
    let layout = ZoneLayout::default();
    assert_eq!(layout.len(), 8);
    assert_eq!(layout.offset("Exhaust"), Some(Vec3::new(-0.4, 0.0, 1.8)));
    assert_eq!(layout.offset("Other"), None);
  }

  #[test]
  fn layout_rejects_bad_entries() {
    assert_eq!(
      ZoneLayout::new([("", Vec3::ZERO)]),
      Err(ZoneLayoutError::EmptyName)
    );
    assert!(matches!(
      ZoneLayout::new([("Motor", Vec3::new(f32::NAN, 0.0, 0.0))]),
      Err(ZoneLayoutError::InvalidOffset { .. })
    ));
  }

  #[test]
  fn placement_offsets_every_zone_from_anchor() {
    let layout = ZoneLayout::new([
      ("Motor", Vec3::new(0.0, 0.2, 0.4)),
      ("Battery", Vec3::new(-0.2, 0.1, 0.3)),
    ])
    .unwrap();
    let mut placement = ZoneMarkerPlacement::new(layout);
    let ids = placement.place(Vec3::new(1.0, 0.0, 0.0));

    assert_eq!(ids.len(), 2);
    let motor = placement.registry().find_zone("Motor").unwrap();
    assert_eq!(motor.position, Vec3::new(1.0, 0.2, 0.4));
    assert!(ids.iter().all(|id| placement.registry().get(*id).is_some()));
  }

  #[test]
  fn registry_ids_are_stable_after_removal() {
    let mut registry = MarkerRegistry::default();
    let a = registry.insert("Motor", Vec3::ZERO);
    let b = registry.insert("Cooling", Vec3::ZERO);
    registry.remove(a);
    let c = registry.insert("Motor", Vec3::ZERO);
    assert_ne!(a, c);
    assert_eq!(registry.get(b).map(|m| m.zone.as_str()), Some("Cooling"));
    assert_eq!(registry.len(), 2);
  }
}
