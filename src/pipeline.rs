// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/pipeline.rs - 逐帧检测流水线
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

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  anchor::{Anchor, AnchorController, AnchorState, PlacementSink, PoseSource, Vec3},
  config::{ConfigError, PipelineConfig},
  frame::Frame,
  model::{Decoder, Detection, InferenceEngine, select_best, suppress},
  preprocess::{PreprocessError, Preprocessor},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("跳过无效帧: {0}")]
  InvalidFrame(#[from] PreprocessError),
  #[error("推理失败，跳过本帧: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("推理连续失败 {0} 帧，流水线停止")]
  EngineExhausted(u32),
}

/// 帧源据此决定是否继续回调
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
  Keep,
  Unregister,
}

/// 单帧处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
  /// 仍在搜索
  Searching { candidates: usize, survivors: usize },
  /// 本帧触发锁定
  Locked { position: Vec3, detection: Detection },
  /// 已锁定或已关闭，帧未被处理
  Inert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
  pub frames_seen: u64,
  pub frames_skipped: u64,
  pub inferences: u64,
  pub engine_failures: u64,
}

/// 检测流水线：`init` / `on_frame` / `shutdown`
pub struct DetectionPipeline<E, P, S>
where
  E: InferenceEngine,
  P: PoseSource,
  S: PlacementSink,
{
  preprocessor: Preprocessor,
  decoder: Decoder,
  iou_threshold: f32,
  max_consecutive_failures: u32,
  consecutive_failures: u32,
  engine: Option<E>,
  pose_source: P,
  controller: AnchorController<S>,
  stats: PipelineStats,
}

impl<E, P, S> DetectionPipeline<E, P, S>
where
  E: InferenceEngine,
  P: PoseSource,
  S: PlacementSink,
{
  pub fn init(
    config: &PipelineConfig,
    engine: E,
    pose_source: P,
    placement: S,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    info!(
      "初始化检测流水线: 输入 {}x{}, 候选 {} x {}, 置信度阈值 {}, IoU 阈值 {}",
      config.model.input_width,
      config.model.input_height,
      config.model.candidates,
      config.model.attributes,
      config.detection.confidence_threshold,
      config.detection.iou_threshold
    );

    Ok(Self {
      preprocessor: Preprocessor::new(config.preprocess()),
      decoder: Decoder::new(
        config.model.candidates,
        config.model.attributes,
        config.detection.confidence_threshold,
      ),
      iou_threshold: config.detection.iou_threshold,
      max_consecutive_failures: config.engine.max_consecutive_failures,
      consecutive_failures: 0,
      engine: Some(engine),
      pose_source,
      controller: AnchorController::new(config.anchor.spawn_distance, placement),
      stats: PipelineStats::default(),
    })
  }

  pub fn state(&self) -> AnchorState {
    self.controller.state()
  }

  pub fn anchor(&self) -> Option<&Anchor<S::Handle>> {
    self.controller.anchor()
  }

  pub fn placement(&self) -> &S {
    self.controller.placement()
  }

  pub fn stats(&self) -> PipelineStats {
    self.stats
  }

  /// 引擎已释放时不再接收帧
  pub fn registration(&self) -> Registration {
    if self.engine.is_some() {
      Registration::Keep
    } else {
      Registration::Unregister
    }
  }

  pub fn on_frame(&mut self, frame: &Frame<'_>) -> Result<FrameOutcome, PipelineError> {
    let Some(engine) = self.engine.as_mut() else {
      return Ok(FrameOutcome::Inert);
    };
    self.stats.frames_seen += 1;

    let input = match self.preprocessor.process(frame) {
      Ok(input) => input,
      Err(e) => {
        self.stats.frames_skipped += 1;
        return Err(e.into());
      }
    };

    self.stats.inferences += 1;
    let raw = match engine.execute(&input) {
      Ok(raw) => {
        self.consecutive_failures = 0;
        raw
      }
      Err(e) => {
        self.stats.frames_skipped += 1;
        self.stats.engine_failures += 1;
        self.consecutive_failures += 1;
        if self.max_consecutive_failures > 0
          && self.consecutive_failures >= self.max_consecutive_failures
        {
          error!("推理连续失败 {} 帧: {}", self.consecutive_failures, e);
          self.release_engine();
          return Err(PipelineError::EngineExhausted(self.consecutive_failures));
        }
        return Err(PipelineError::Engine(Box::new(e)));
      }
    };
    drop(input);

    let decoded = self
      .decoder
      .decode(raw.as_slice(), frame.width, frame.height);
    let candidates = decoded.detections.len();
    let filtered = suppress(decoded.detections, self.iou_threshold);
    let survivors = filtered.len();

    let Some(best) = select_best(&filtered) else {
      return Ok(FrameOutcome::Searching {
        candidates,
        survivors,
      });
    };
    debug!(
      "最优检测: 置信度 {:.3}, 框 ({:.1}, {:.1}, {:.1}, {:.1})",
      best.confidence, best.rect.x, best.rect.y, best.rect.width, best.rect.height
    );

    if !self.controller.lock(self.pose_source.current_pose()) {
      return Ok(FrameOutcome::Searching {
        candidates,
        survivors,
      });
    }

    self.release_engine();
    let position = self
      .controller
      .anchor()
      .map(|anchor| anchor.position)
      .unwrap_or_default();
    info!("检测已锁定，停止推理");
    Ok(FrameOutcome::Locked {
      position,
      detection: best,
    })
  }

  /// 释放推理引擎，可重复调用
  pub fn shutdown(&mut self) {
    if self.engine.is_some() {
      warn!("关闭检测流水线");
    }
    self.release_engine();
  }

  fn release_engine(&mut self) {
    if let Some(mut engine) = self.engine.take() {
      engine.dispose();
    }
  }
}

impl<E, P, S> Drop for DetectionPipeline<E, P, S>
where
  E: InferenceEngine,
  P: PoseSource,
  S: PlacementSink,
{
  fn drop(&mut self) {
    self.release_engine();
  }
}
