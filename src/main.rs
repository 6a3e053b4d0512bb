// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/main.rs - 项目主程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use chepai::{
  FromUrl,
  anchor::{FixedPose, Vec3},
  config::PipelineConfig,
  input::InputWrapper,
  model::{Detection, TractEngineBuilder},
  output::OutputWrapper,
  pipeline::DetectionPipeline,
  placement::{Marker, ZoneMarkerPlacement},
  task::{ContinuousTask, Task, install_interrupt_handler},
};

/// Chepai 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 tract:///models/plate.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源：image:///a.jpg 或 dir:///frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 覆盖置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 覆盖 NMS IoU 阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
  /// 覆盖锚点距离（米）
  #[arg(long, value_name = "METERS")]
  pub spawn_distance: Option<f32>,
  /// 锁定帧快照路径，例如 image:///tmp/lock.png
  #[arg(long, value_name = "OUTPUT")]
  pub snapshot: Option<Url>,
  /// 最多处理的帧数，0 表示不限
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: u64,
}

impl Args {
  fn apply(&self, config: &mut PipelineConfig) {
    if let Some(confidence) = self.confidence {
      config.detection.confidence_threshold = confidence;
    }
    if let Some(iou) = self.iou {
      config.detection.iou_threshold = iou;
    }
    if let Some(distance) = self.spawn_distance {
      config.anchor.spawn_distance = distance;
    }
  }
}

#[derive(Serialize)]
struct LockReport<'a> {
  timestamp: String,
  frame: u64,
  anchor: Vec3,
  detection: Detection,
  markers: Vec<&'a Marker>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let mut config = match &args.config {
    Some(path) => PipelineConfig::load(path)?,
    None => PipelineConfig::default(),
  };
  args.apply(&mut config);

  let engine = TractEngineBuilder::from_url(&args.model)?
    .input_size(
      config.model.input_width as usize,
      config.model.input_height as usize,
    )
    .build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = args
    .snapshot
    .as_ref()
    .map(OutputWrapper::from_url)
    .transpose()?;

  let mut pipeline = DetectionPipeline::init(
    &config,
    engine,
    FixedPose(config.anchor.fixed_pose()),
    ZoneMarkerPlacement::new(config.zones.clone()),
  )?;

  let interrupt = install_interrupt_handler()?;
  let summary = ContinuousTask::default()
    .with_frame_number(Some(args.frame_number))
    .with_interrupt(interrupt)
    .run_task(input, &mut pipeline, output)?;

  match summary.lock {
    Some(lock) => {
      let report = LockReport {
        timestamp: chrono::Local::now().to_rfc3339(),
        frame: lock.frame_number,
        anchor: lock.position,
        detection: lock.detection,
        markers: pipeline.placement().registry().iter().collect(),
      };
      println!("{}", serde_json::to_string(&report)?);
    }
    None => warn!("处理了 {} 帧，未检测到车牌", summary.frames),
  }

  pipeline.shutdown();
  Ok(())
}
