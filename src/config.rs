// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  anchor::{Pose, Vec3},
  model::decode::MIN_ATTRIBUTES,
  placement::ZoneLayout,
  preprocess::{ChannelOrder, PreprocessConfig},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("配置文件解析失败: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("配置项 {key} 无效: {reason}")]
  Invalid { key: &'static str, reason: String },
}

impl ConfigError {
  fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
    ConfigError::Invalid {
      key,
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  pub input_width: u32,
  pub input_height: u32,
  /// 每帧候选框数量 N
  pub candidates: usize,
  /// 每个候选框的属性数 D
  pub attributes: usize,
  pub channel_order: ChannelOrder,
  pub flip_vertical: bool,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      input_width: 640,
      input_height: 640,
      candidates: 25200,
      attributes: 6,
      channel_order: ChannelOrder::Bgr,
      flip_vertical: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.5,
      iou_threshold: crate::model::nms::DEFAULT_IOU_THRESHOLD,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
  /// 锚点距设备的距离（米）
  pub spawn_distance: f32,
  /// 没有跟踪能力时使用的固定设备位置
  pub device_position: [f32; 3],
  pub device_forward: [f32; 3],
}

impl Default for AnchorConfig {
  fn default() -> Self {
    Self {
      spawn_distance: 0.8,
      device_position: [0.0, 0.0, 0.0],
      device_forward: [0.0, 0.0, 1.0],
    }
  }
}

impl AnchorConfig {
  pub fn fixed_pose(&self) -> Pose {
    Pose {
      position: Vec3::from(self.device_position),
      forward: Vec3::from(self.device_forward),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// 连续推理失败多少帧后放弃，0 表示不限
  pub max_consecutive_failures: u32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_consecutive_failures: 30,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub model: ModelConfig,
  pub detection: DetectionConfig,
  pub anchor: AnchorConfig,
  pub engine: EngineConfig,
  pub zones: ZoneLayout,
}

impl PipelineConfig {
  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    let config: PipelineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    info!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&text)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let unit = |key: &'static str, value: f32| {
      if (0.0..=1.0).contains(&value) {
        Ok(())
      } else {
        Err(ConfigError::invalid(key, format!("{} 不在 [0, 1] 内", value)))
      }
    };
    unit("detection.confidence_threshold", self.detection.confidence_threshold)?;
    unit("detection.iou_threshold", self.detection.iou_threshold)?;

    if self.model.input_width == 0 || self.model.input_height == 0 {
      return Err(ConfigError::invalid(
        "model.input_width/input_height",
        "输入尺寸必须大于 0",
      ));
    }
    if self.model.candidates == 0 {
      return Err(ConfigError::invalid("model.candidates", "候选框数量必须大于 0"));
    }
    if self.model.attributes < MIN_ATTRIBUTES {
      return Err(ConfigError::invalid(
        "model.attributes",
        format!("至少需要 {} 个属性", MIN_ATTRIBUTES),
      ));
    }
    if self
      .model
      .candidates
      .checked_mul(self.model.attributes)
      .is_none()
    {
      return Err(ConfigError::invalid(
        "model.candidates",
        "候选框数量与属性数之积溢出",
      ));
    }

    let distance = self.anchor.spawn_distance;
    if !distance.is_finite() || distance < 0.0 {
      return Err(ConfigError::invalid(
        "anchor.spawn_distance",
        format!("{} 不是有效距离", distance),
      ));
    }
    let pose = self.anchor.fixed_pose();
    if !pose.position.is_finite() || !pose.forward.is_finite() {
      return Err(ConfigError::invalid("anchor.device_position/device_forward", "包含非有限值"));
    }

    Ok(())
  }

  pub fn preprocess(&self) -> PreprocessConfig {
    PreprocessConfig {
      input_width: self.model.input_width,
      input_height: self.model.input_height,
      channel_order: self.model.channel_order,
      flip_vertical: self.model.flip_vertical,
    }
  }
}
