// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/model/decode.rs - 模型输出解码
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

use tracing::{debug, trace};

use crate::model::{Detection, Rect};

const ATTR_CX: usize = 0;
const ATTR_CY: usize = 1;
const ATTR_W: usize = 2;
const ATTR_H: usize = 3;
const ATTR_CONFIDENCE: usize = 4;

/// 最少需要的属性数：cx, cy, w, h, confidence
pub const MIN_ATTRIBUTES: usize = ATTR_CONFIDENCE + 1;

/// 解码结果
#[derive(Debug, Clone, Default)]
pub struct Decoded {
  /// 置信度过滤后的检测结果，按行号顺序
  pub detections: Vec<Detection>,
  /// 实际读到的候选行数
  pub rows_read: usize,
  /// 输出比 N × D 短，后面的行被跳过
  pub truncated: bool,
}

/// 把 N × D 的原始输出解释为候选框
///
/// 几何属性是模型输入空间中的归一化坐标，解码时直接按帧的像素尺寸缩放，
/// 不裁剪到帧边界。
#[derive(Debug, Clone)]
pub struct Decoder {
  candidates: usize,
  attributes: usize,
  confidence_threshold: f32,
}

impl Decoder {
  pub fn new(candidates: usize, attributes: usize, confidence_threshold: f32) -> Self {
    Self {
      candidates,
      attributes: attributes.max(MIN_ATTRIBUTES),
      confidence_threshold,
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn decode(&self, raw: &[f32], frame_width: u32, frame_height: u32) -> Decoded {
    let fw = frame_width as f32;
    let fh = frame_height as f32;
    let mut decoded = Decoded::default();

    for row in 0..self.candidates {
      let base = row
        .checked_mul(self.attributes)
        .filter(|base| base.saturating_add(ATTR_CONFIDENCE) < raw.len());
      let Some(base) = base else {
        // 输出被截断，后续行一律跳过
        decoded.truncated = true;
        debug!(
          "模型输出被截断: 长度 {}, 期望 {}, 仅读取 {} 行",
          raw.len(),
          self.candidates.saturating_mul(self.attributes),
          row
        );
        break;
      };
      decoded.rows_read += 1;

      let confidence = raw[base + ATTR_CONFIDENCE];
      // NaN 也在这里被丢弃
      if !(confidence >= self.confidence_threshold) {
        continue;
      }

      let scaled_x = raw[base + ATTR_CX] * fw;
      let scaled_y = raw[base + ATTR_CY] * fh;
      let scaled_w = raw[base + ATTR_W] * fw;
      let scaled_h = raw[base + ATTR_H] * fh;

      let rect = Rect::from_center(scaled_x, scaled_y, scaled_w, scaled_h);
      trace!(
        "候选 {}: 置信度 {:.3}, 位置 ({:.1}, {:.1}), 尺寸 ({:.1}, {:.1})",
        row, confidence, scaled_x, scaled_y, scaled_w, scaled_h
      );

      decoded.detections.push(Detection { confidence, rect });
    }

    debug!(
      "解码完成: 读取 {} 行, 通过阈值 {} 个",
      decoded.rows_read,
      decoded.detections.len()
    );
    decoded
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(cx: f32, cy: f32, w: f32, h: f32, conf: f32) -> [f32; 6] {
    [cx, cy, w, h, conf, 0.0]
  }

  fn buffer(rows: &[[f32; 6]]) -> Vec<f32> {
    rows.iter().flatten().copied().collect()
  }

  #[test]
  fn rows_below_threshold_are_dropped() {
    let raw = buffer(&[
      row(0.5, 0.5, 0.1, 0.1, 0.49),
      row(0.5, 0.5, 0.1, 0.1, 0.5),
      row(0.5, 0.5, 0.1, 0.1, f32::NAN),
    ]);
    let decoded = Decoder::new(3, 6, 0.5).decode(&raw, 100, 100);
    assert_eq!(decoded.detections.len(), 1);
    assert_eq!(decoded.detections[0].confidence, 0.5);
    assert!(!decoded.truncated);
  }

  #[test]
  fn coordinates_are_scaled_per_axis() {
    let raw = buffer(&[row(0.25, 0.5, 0.5, 0.2, 0.9)]);
    let decoded = Decoder::new(1, 6, 0.5).decode(&raw, 200, 100);
    let rect = decoded.detections[0].rect;
    assert_eq!(rect, Rect::new(0.0, 40.0, 100.0, 20.0));
  }

  #[test]
  fn truncated_buffer_keeps_complete_rows() {
    let mut raw = buffer(&[row(0.5, 0.5, 0.1, 0.1, 0.9), row(0.2, 0.2, 0.1, 0.1, 0.9)]);
    // 第二行只剩 cx, cy, w, h，置信度缺失
    raw.truncate(10);
    let decoded = Decoder::new(25200, 6, 0.5).decode(&raw, 100, 100);
    assert!(decoded.truncated);
    assert_eq!(decoded.rows_read, 1);
    assert_eq!(decoded.detections.len(), 1);
  }

  #[test]
  fn empty_buffer_yields_nothing() {
    let decoded = Decoder::new(25200, 6, 0.5).decode(&[], 640, 480);
    assert!(decoded.detections.is_empty());
    assert!(decoded.truncated);
  }

  #[test]
  fn boxes_are_not_clamped_to_the_frame() {
    let raw = buffer(&[row(0.0, 1.0, 0.4, 0.4, 0.8)]);
    let decoded = Decoder::new(1, 6, 0.5).decode(&raw, 100, 100);
    let rect = decoded.detections[0].rect;
    assert!(rect.x < 0.0);
    assert!(rect.y_max() > 100.0);
  }

  #[test]
  fn extra_rows_beyond_candidate_count_are_ignored() {
    let raw = buffer(&[row(0.5, 0.5, 0.1, 0.1, 0.1), row(0.5, 0.5, 0.1, 0.1, 0.9)]);
    let decoded = Decoder::new(1, 6, 0.5).decode(&raw, 100, 100);
    assert_eq!(decoded.rows_read, 1);
    assert!(decoded.detections.is_empty());
  }

  #[test]
  fn huge_candidate_count_stops_at_buffer_end() {
    let raw = buffer(&[row(0.5, 0.5, 0.1, 0.1, 0.9)]);
    let decoded = Decoder::new(usize::MAX, 6, 0.5).decode(&raw, 100, 100);
    assert_eq!(decoded.rows_read, 1);
    assert_eq!(decoded.detections.len(), 1);
    assert!(decoded.truncated);
  }
}
