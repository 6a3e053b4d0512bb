// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/task.rs - 帧循环任务
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

use std::{
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  anchor::{PlacementSink, PoseSource, Vec3},
  frame::OwnedFrame,
  model::{Detection, InferenceEngine},
  output::Render,
  pipeline::{DetectionPipeline, FrameOutcome, PipelineError, Registration},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 注册 Ctrl-C 处理；进程内只能调用一次
pub fn install_interrupt_handler() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockEvent {
  /// 触发锁定的帧序号（从 1 开始计数）
  pub frame_number: u64,
  pub position: Vec3,
  pub detection: Detection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSummary {
  pub frames: u64,
  pub lock: Option<LockEvent>,
}

/// 逐帧驱动检测流水线，直到锁定、帧源耗尽、达到帧数上限或收到中断
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

impl<'p, I, E, P, S, O> Task<I, &'p mut DetectionPipeline<E, P, S>, Option<O>> for ContinuousTask
where
  I: Iterator<Item = OwnedFrame>,
  E: InferenceEngine,
  P: PoseSource,
  S: PlacementSink,
  O: Render<OwnedFrame, Detection>,
  O::Error: std::fmt::Display,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &'p mut DetectionPipeline<E, P, S>,
    output: Option<O>,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();

    for frame in input {
      summary.frames += 1;
      let now = Instant::now();
      match pipeline.on_frame(&frame.as_frame()) {
        Ok(FrameOutcome::Locked {
          position,
          detection,
        }) => {
          info!(
            "第 {} 帧锁定，锚点 ({:.3}, {:.3}, {:.3})，耗时 {:.2?}",
            summary.frames,
            position.x,
            position.y,
            position.z,
            now.elapsed()
          );
          if let Some(output) = &output
            && let Err(e) = output.render_result(&frame, &detection)
          {
            warn!("锁定帧快照保存失败: {}", e);
          }
          summary.lock = Some(LockEvent {
            frame_number: summary.frames,
            position,
            detection,
          });
        }
        Ok(FrameOutcome::Searching {
          candidates,
          survivors,
        }) => {
          debug!(
            "第 {} 帧: 候选 {}，抑制后 {}，耗时 {:.2?}",
            summary.frames,
            candidates,
            survivors,
            now.elapsed()
          );
        }
        Ok(FrameOutcome::Inert) => {}
        Err(e @ PipelineError::EngineExhausted(_)) => return Err(e.into()),
        Err(e) => warn!("第 {} 帧: {}", summary.frames, e),
      }

      if pipeline.registration() == Registration::Unregister {
        info!("流水线已注销，退出任务循环");
        break;
      }
      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", summary.frames);
    Ok(summary)
  }
}
