// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/model/nms.rs - 非极大值抑制与最优结果选择
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

use tracing::debug;

use crate::model::Detection;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// 排序键：-0.0 与 0.0 视为同分，NaN 排在最后
fn rank(confidence: f32) -> f32 {
  if confidence.is_nan() {
    f32::NEG_INFINITY
  } else {
    confidence + 0.0
  }
}

/// 贪心非极大值抑制
///
/// 按置信度降序稳定排序（同分保持解码行序），每次取出剩余中置信度最高的一个，
/// 并移除与其 IoU 超过阈值的其他框。返回结果同样按置信度降序排列。
pub fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  let total = detections.len();
  // sort_by 是稳定排序
  detections.sort_by(|a, b| rank(b.confidence).total_cmp(&rank(a.confidence)));

  let mut result = Vec::new();
  let mut remaining = detections.into_iter();

  while let Some(best) = remaining.next() {
    let rest: Vec<Detection> = remaining
      .filter(|det| best.rect.iou(&det.rect) <= iou_threshold)
      .collect();
    result.push(best);
    remaining = rest.into_iter();
  }

  debug!("NMS: {} 个候选, 保留 {} 个", total, result.len());
  result
}

/// 取出置信度最高的检测结果
///
/// `suppress` 的输出已经按置信度降序排列，第一个就是最优解。
pub fn select_best(filtered: &[Detection]) -> Option<Detection> {
  filtered.first().copied()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Rect;

  fn det(confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
    Detection {
      confidence,
      rect: Rect::new(x, y, w, h),
    }
  }

  #[test]
  fn overlapping_lower_confidence_box_is_removed() {
    let kept = suppress(
      vec![
        det(0.6, 2.0, 0.0, 100.0, 100.0),
        det(0.9, 0.0, 0.0, 100.0, 100.0),
      ],
      0.5,
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.9);
  }

  #[test]
  fn separate_clusters_each_keep_one_representative() {
    let kept = suppress(
      vec![
        det(0.7, 0.0, 0.0, 10.0, 10.0),
        det(0.8, 100.0, 100.0, 10.0, 10.0),
        det(0.6, 1.0, 1.0, 10.0, 10.0),
        det(0.95, 101.0, 101.0, 10.0, 10.0),
      ],
      0.5,
    );
    let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.95, 0.7]);
  }

  #[test]
  fn overlap_not_above_threshold_is_kept() {
    // IoU = 1/3
    let kept = suppress(
      vec![det(0.9, 0.0, 0.0, 10.0, 10.0), det(0.8, 5.0, 0.0, 10.0, 10.0)],
      1.0 / 3.0 + 1e-6,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn ties_keep_decoder_order() {
    let first = det(0.8, 0.0, 0.0, 10.0, 10.0);
    let second = det(0.8, 1.0, 0.0, 10.0, 10.0);
    let kept = suppress(vec![first, second], 0.5);
    assert_eq!(kept, vec![first]);
  }

  #[test]
  fn signed_zero_confidences_tie() {
    let negative = det(-0.0, 0.0, 0.0, 10.0, 10.0);
    let positive = det(0.0, 50.0, 0.0, 10.0, 10.0);
    let kept = suppress(vec![negative, positive], 0.5);
    assert_eq!(kept[0].rect.x, 0.0);
    assert_eq!(kept[1].rect.x, 50.0);
  }

  #[test]
  fn second_pass_changes_nothing() {
    let input = vec![
      det(0.9, 0.0, 0.0, 50.0, 50.0),
      det(0.85, 10.0, 10.0, 50.0, 50.0),
      det(0.8, 40.0, 40.0, 50.0, 50.0),
      det(0.7, 200.0, 0.0, 30.0, 30.0),
      det(0.65, 210.0, 5.0, 30.0, 30.0),
    ];
    let once = suppress(input, 0.5);
    let twice = suppress(once.clone(), 0.5);
    assert_eq!(once, twice);
  }

  #[test]
  fn survivors_never_overlap_beyond_threshold() {
    let mut input = Vec::new();
    for i in 0..40 {
      let f = i as f32;
      input.push(det(
        0.5 + (i % 7) as f32 * 0.05,
        (f * 7.0) % 90.0,
        (f * 13.0) % 60.0,
        20.0 + (i % 3) as f32 * 5.0,
        20.0,
      ));
    }
    let kept = suppress(input, 0.5);
    for (i, a) in kept.iter().enumerate() {
      for b in kept.iter().skip(i + 1) {
        assert!(a.rect.iou(&b.rect) <= 0.5);
      }
    }
    assert!(kept.windows(2).all(|w| w[0].confidence >= w[1].confidence));
  }

  #[test]
  fn select_best_matches_linear_scan() {
    let kept = suppress(
      vec![
        det(0.55, 0.0, 0.0, 10.0, 10.0),
        det(0.75, 50.0, 0.0, 10.0, 10.0),
        det(0.75, 100.0, 0.0, 10.0, 10.0),
      ],
      0.5,
    );
    let mut scan = kept[0];
    for d in &kept[1..] {
      if d.confidence > scan.confidence {
        scan = *d;
      }
    }
    assert_eq!(select_best(&kept), Some(scan));
    assert_eq!(select_best(&[]), None);
  }
}
