// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/preprocess.rs - 帧预处理
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

use image::{RgbImage, imageops::FilterType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::frame::{Frame, InputBuffer};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("无效帧: 尺寸 {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("无效帧: 数据长度 {actual}, 期望 {expected}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 模型期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
  Rgb,
  #[default]
  Bgr,
}

impl ChannelOrder {
  /// 输出通道 `c` 对应的 RGB 分量下标
  fn source_index(&self, c: usize) -> usize {
    match self {
      ChannelOrder::Rgb => c,
      ChannelOrder::Bgr => 2 - c,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub channel_order: ChannelOrder,
  /// 转换时上下翻转帧
  pub flip_vertical: bool,
}

impl Default for PreprocessConfig {
  fn default() -> Self {
    Self {
      input_width: 640,
      input_height: 640,
      channel_order: ChannelOrder::Bgr,
      flip_vertical: false,
    }
  }
}

/// 把任意尺寸的帧拉伸到模型输入尺寸（不保持宽高比），
/// 按模型通道顺序输出 NCHW 的 [0, 1] 浮点张量
pub struct Preprocessor {
  config: PreprocessConfig,
  scratch: Option<RgbImage>,
}

impl Preprocessor {
  pub fn new(config: PreprocessConfig) -> Self {
    Self {
      config,
      scratch: None,
    }
  }

  pub fn config(&self) -> &PreprocessConfig {
    &self.config
  }

  pub fn process(&mut self, frame: &Frame<'_>) -> Result<InputBuffer, PreprocessError> {
    if frame.is_empty() {
      return Err(PreprocessError::EmptyFrame {
        width: frame.width,
        height: frame.height,
      });
    }
    let expected = frame.expected_len().unwrap_or(usize::MAX);
    if frame.data.len() != expected {
      return Err(PreprocessError::LengthMismatch {
        expected,
        actual: frame.data.len(),
      });
    }

    let config = self.config;
    let scratch = self.scratch_for(frame.width, frame.height);
    fill_rgb(scratch, frame, config.flip_vertical);

    let resized = image::imageops::resize(
      &*scratch,
      config.input_width,
      config.input_height,
      FilterType::Triangle,
    );

    Ok(to_planes(&resized, config.channel_order))
  }

  /// 帧尺寸变化时才重新分配缓冲
  fn scratch_for(&mut self, width: u32, height: u32) -> &mut RgbImage {
    let stale = self
      .scratch
      .as_ref()
      .is_none_or(|img| img.dimensions() != (width, height));
    if stale {
      debug!("重新分配预处理缓冲: {}x{}", width, height);
      self.scratch = Some(RgbImage::new(width, height));
    }
    self.scratch.get_or_insert_with(|| RgbImage::new(width, height))
  }
}

fn fill_rgb(image: &mut RgbImage, frame: &Frame<'_>, flip_vertical: bool) {
  let bpp = frame.format.bytes_per_pixel();
  let width = frame.width as usize;
  let height = frame.height as usize;

  for (y, row) in image.rows_mut().enumerate() {
    let src_y = if flip_vertical { height - 1 - y } else { y };
    let src_row = &frame.data[src_y * width * bpp..(src_y + 1) * width * bpp];
    for (pixel, src) in row.zip(src_row.chunks_exact(bpp)) {
      pixel.0 = frame.format.rgb_at(src);
    }
  }
}

fn to_planes(image: &RgbImage, order: ChannelOrder) -> InputBuffer {
  let (width, height) = image.dimensions();
  let mut buffer = InputBuffer::with_shape(height as usize, width as usize);
  let plane_size = (width * height) as usize;
  let slice = buffer.as_mut();

  for (idx, pixel) in image.pixels().enumerate() {
    for c in 0..3 {
      slice[c * plane_size + idx] = pixel[order.source_index(c)] as f32 / 255.0;
    }
  }
  buffer
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::PixelFormat;

  fn config(width: u32, height: u32, order: ChannelOrder) -> PreprocessConfig {
    PreprocessConfig {
      input_width: width,
      input_height: height,
      channel_order: order,
      flip_vertical: false,
    }
  }

  #[test]
  fn zero_sized_frame_is_rejected() {
    let mut pre = Preprocessor::new(PreprocessConfig::default());
    let frame = Frame::new(0, 480, PixelFormat::Rgba8, &[]);
    assert_eq!(
      pre.process(&frame).unwrap_err(),
      PreprocessError::EmptyFrame {
        width: 0,
        height: 480
      }
    );
  }

  #[test]
  fn short_pixel_buffer_is_rejected() {
    let mut pre = Preprocessor::new(PreprocessConfig::default());
    let data = vec![0u8; 10];
    let frame = Frame::new(2, 2, PixelFormat::Rgba8, &data);
    assert!(matches!(
      pre.process(&frame),
      Err(PreprocessError::LengthMismatch {
        expected: 16,
        actual: 10
      })
    ));
  }

  #[test]
  fn solid_color_is_normalized_into_bgr_planes() {
    let mut pre = Preprocessor::new(config(4, 4, ChannelOrder::Bgr));
    let data: Vec<u8> = [255u8, 0, 51, 255].repeat(8 * 6);
    let frame = Frame::new(8, 6, PixelFormat::Rgba8, &data);
    let input = pre.process(&frame).unwrap();

    assert_eq!(input.shape(), [1, 3, 4, 4]);
    assert!(input.plane(0).iter().all(|v| (v - 0.2).abs() < 1e-6));
    assert!(input.plane(1).iter().all(|v| *v == 0.0));
    assert!(input.plane(2).iter().all(|v| (v - 1.0).abs() < 1e-6));
  }

  #[test]
  fn rgb_order_keeps_source_channels() {
    let mut pre = Preprocessor::new(config(2, 2, ChannelOrder::Rgb));
    let data: Vec<u8> = [0u8, 0, 255].repeat(4);
    let frame = Frame::new(2, 2, PixelFormat::Bgr8, &data);
    let input = pre.process(&frame).unwrap();
    assert!(input.plane(0).iter().all(|v| (v - 1.0).abs() < 1e-6));
    assert!(input.plane(2).iter().all(|v| *v == 0.0));
  }

  #[test]
  fn flip_vertical_mirrors_rows() {
    let mut cfg = config(1, 2, ChannelOrder::Rgb);
    cfg.flip_vertical = true;
    let mut pre = Preprocessor::new(cfg);
    // 上一行黑，下一行白
    let data = vec![0u8, 0, 0, 255, 255, 255];
    let frame = Frame::new(1, 2, PixelFormat::Rgb8, &data);
    let input = pre.process(&frame).unwrap();
    assert_eq!(input.plane(0), &[1.0, 0.0]);
  }

  #[test]
  fn scratch_follows_frame_size() {
    let mut pre = Preprocessor::new(config(4, 4, ChannelOrder::Rgb));
    let small = vec![0u8; 2 * 2 * 3];
    let large = vec![0u8; 8 * 4 * 3];
    pre.process(&Frame::new(2, 2, PixelFormat::Rgb8, &small)).unwrap();
    assert_eq!(pre.scratch.as_ref().map(|s| s.dimensions()), Some((2, 2)));
    pre.process(&Frame::new(8, 4, PixelFormat::Rgb8, &large)).unwrap();
    assert_eq!(pre.scratch.as_ref().map(|s| s.dimensions()), Some((8, 4)));
  }
}
