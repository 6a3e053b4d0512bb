// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/anchor.rs - 锚点状态机
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

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 世界坐标系下的三维向量（米）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
  pub x: f32,
  pub y: f32,
  pub z: f32,
}

impl Vec3 {
  pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
  pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, 1.0);

  pub const fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }

  pub fn length(&self) -> f32 {
    (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
  }

  /// 单位化；零向量保持为零
  pub fn normalized(&self) -> Vec3 {
    let len = self.length();
    if len > 0.0 { *self * (1.0 / len) } else { Vec3::ZERO }
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
  }
}

impl Add for Vec3 {
  type Output = Vec3;

  fn add(self, rhs: Vec3) -> Vec3 {
    Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
  }
}

impl Sub for Vec3 {
  type Output = Vec3;

  fn sub(self, rhs: Vec3) -> Vec3 {
    Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
  }
}

impl Mul<f32> for Vec3 {
  type Output = Vec3;

  fn mul(self, rhs: f32) -> Vec3 {
    Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
  }
}

impl From<[f32; 3]> for Vec3 {
  fn from([x, y, z]: [f32; 3]) -> Self {
    Vec3::new(x, y, z)
  }
}

/// 设备位姿：位置与正前方朝向
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
  pub position: Vec3,
  pub forward: Vec3,
}

/// 世界跟踪子系统提供的当前设备位姿；跟踪丢失时返回 `None`
pub trait PoseSource {
  fn current_pose(&self) -> Option<Pose>;
}

/// 固定位姿，用于回放文件或没有跟踪能力的场景
#[derive(Debug, Clone, Copy)]
pub struct FixedPose(pub Pose);

impl PoseSource for FixedPose {
  fn current_pose(&self) -> Option<Pose> {
    Some(self.0)
  }
}

impl<P: PoseSource + ?Sized> PoseSource for Box<P> {
  fn current_pose(&self) -> Option<Pose> {
    (**self).current_pose()
  }
}

/// 在给定世界坐标放置外部内容
pub trait PlacementSink {
  type Handle;

  fn place(&mut self, position: Vec3) -> Self::Handle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorState {
  Searching,
  Locked,
}

/// 锁定后的锚点
#[derive(Debug, Clone)]
pub struct Anchor<H> {
  pub position: Vec3,
  pub content: H,
}

/// 锚点位置 = 设备位置 + 设备正前方 × 放置距离
///
/// 检测框在图像中的位置不参与计算。
pub fn anchor_point(pose: &Pose, spawn_distance: f32) -> Vec3 {
  pose.position + pose.forward.normalized() * spawn_distance
}

/// 一次性的 `Searching -> Locked` 状态机
pub struct AnchorController<S: PlacementSink> {
  spawn_distance: f32,
  placement: S,
  anchor: Option<Anchor<S::Handle>>,
}

impl<S: PlacementSink> AnchorController<S> {
  pub fn new(spawn_distance: f32, placement: S) -> Self {
    Self {
      spawn_distance,
      placement,
      anchor: None,
    }
  }

  pub fn state(&self) -> AnchorState {
    match self.anchor {
      Some(_) => AnchorState::Locked,
      None => AnchorState::Searching,
    }
  }

  pub fn is_locked(&self) -> bool {
    self.anchor.is_some()
  }

  pub fn anchor(&self) -> Option<&Anchor<S::Handle>> {
    self.anchor.as_ref()
  }

  pub fn placement(&self) -> &S {
    &self.placement
  }

  /// 尝试锁定。已锁定时不做任何事；没有位姿时保持 `Searching`。
  ///
  /// 返回值表示本次调用是否发生了状态转换。
  pub fn lock(&mut self, pose: Option<Pose>) -> bool {
    if self.anchor.is_some() {
      return false;
    }
    let Some(pose) = pose else {
      warn!("设备位姿不可用，暂不锁定");
      return false;
    };

    let position = anchor_point(&pose, self.spawn_distance);
    info!(
      "锁定锚点: ({:.3}, {:.3}, {:.3})",
      position.x, position.y, position.z
    );
    let content = self.placement.place(position);
    self.anchor = Some(Anchor { position, content });
    true
  }
}
