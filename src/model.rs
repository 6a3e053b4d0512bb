// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::frame::InputBuffer;

pub mod decode;
pub mod nms;

#[cfg(feature = "backend_tract")]
mod tract_engine;
#[cfg(feature = "backend_tract")]
pub use self::tract_engine::{TractEngine, TractEngineBuilder, TractEngineError};

pub use self::decode::{Decoded, Decoder};
pub use self::nms::{select_best, suppress};

/// 推理引擎：输入张量进，原始输出张量出
///
/// 引擎由流水线独占持有。`dispose` 必须是幂等的：
/// 对已经释放的引擎再次调用不做任何事。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn execute(&mut self, input: &InputBuffer) -> Result<RawOutput, Self::Error>;

  fn dispose(&mut self);
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
  type Error = E::Error;

  fn execute(&mut self, input: &InputBuffer) -> Result<RawOutput, Self::Error> {
    (**self).execute(input)
  }

  fn dispose(&mut self) {
    (**self).dispose()
  }
}

/// 模型的原始输出，逻辑上是 N 行 × D 个属性的扁平数组
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
  data: Box<[f32]>,
}

impl RawOutput {
  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl From<Vec<f32>> for RawOutput {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

/// 像素坐标下的矩形，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点和宽高构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
  }

  pub fn x_max(&self) -> f32 {
    self.x + self.width
  }

  pub fn y_max(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  pub fn center(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  /// 交并比，结果在 [0, 1] 内；不相交或并集面积为 0 时返回 0
  pub fn iou(&self, other: &Rect) -> f32 {
    let inter_w = (self.x_max().min(other.x_max()) - self.x.max(other.x)).max(0.0);
    let inter_h = (self.y_max().min(other.y_max()) - self.y.max(other.y)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      (intersection / union).clamp(0.0, 1.0)
    } else {
      0.0
    }
  }
}

/// 单个检测结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  pub confidence: f32,
  pub rect: Rect,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = Rect::new(10.0, 10.0, 20.0, 20.0);
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(50.0, 50.0, 10.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(b.iou(&a), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    // 交集 50，并集 150
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(5.0, 0.0, 10.0, 10.0);
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let a = Rect::new(5.0, 5.0, 0.0, 0.0);
    assert_eq!(a.iou(&a), 0.0);
  }

  #[test]
  fn from_center_converts_to_corner_form() {
    let r = Rect::from_center(640.0, 360.0, 128.0, 72.0);
    assert_eq!(r, Rect::new(576.0, 324.0, 128.0, 72.0));
    assert_eq!(r.center(), (640.0, 360.0));
  }
}
