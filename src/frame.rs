// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/frame.rs - 相机帧与模型输入张量定义
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

use image::RgbImage;

pub const RGB_CHANNELS: usize = 3;

/// 帧源给出的像素格式，紧密排列，无行填充
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgba8,
  Bgra8,
  Rgb8,
  Bgr8,
}

impl PixelFormat {
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
    }
  }

  /// 读取一个像素并返回 [r, g, b]
  #[inline]
  pub fn rgb_at(&self, px: &[u8]) -> [u8; 3] {
    match self {
      PixelFormat::Rgba8 | PixelFormat::Rgb8 => [px[0], px[1], px[2]],
      PixelFormat::Bgra8 | PixelFormat::Bgr8 => [px[2], px[1], px[0]],
    }
  }
}

/// 借用的相机帧，只在一次预处理调用期间有效
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
  pub width: u32,
  pub height: u32,
  pub format: PixelFormat,
  pub data: &'a [u8],
}

impl<'a> Frame<'a> {
  pub fn new(width: u32, height: u32, format: PixelFormat, data: &'a [u8]) -> Self {
    Self {
      width,
      height,
      format,
      data,
    }
  }

  /// 按宽高和格式计算出的期望字节数
  pub fn expected_len(&self) -> Option<usize> {
    (self.width as usize)
      .checked_mul(self.height as usize)?
      .checked_mul(self.format.bytes_per_pixel())
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

/// 持有像素数据的帧，由文件输入源等产生
#[derive(Debug, Clone)]
pub struct OwnedFrame {
  pub width: u32,
  pub height: u32,
  pub format: PixelFormat,
  pub data: Box<[u8]>,
  /// 帧序号
  pub index: u64,
}

impl OwnedFrame {
  pub fn as_frame(&self) -> Frame<'_> {
    Frame::new(self.width, self.height, self.format, &self.data)
  }

  pub fn with_index(mut self, index: u64) -> Self {
    self.index = index;
    self
  }

  /// 转为 RGB 图像，用于调试输出；缺失的像素填黑
  pub fn to_rgb_image(&self) -> RgbImage {
    let format = self.format;
    let bpp = format.bytes_per_pixel();
    let width = self.width as usize;
    let data = &self.data;
    RgbImage::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * width + x as usize) * bpp;
      let rgb = data
        .get(idx..idx + bpp)
        .map(|px| format.rgb_at(px))
        .unwrap_or([0; 3]);
      image::Rgb(rgb)
    })
  }
}

impl From<RgbImage> for OwnedFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      format: PixelFormat::Rgb8,
      data: image.into_raw().into_boxed_slice(),
      index: 0,
    }
  }
}

/// 模型输入：NCHW 布局（N = 1），每个通道一个连续平面，取值 [0, 1]
#[derive(Debug, Clone)]
pub struct InputBuffer {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl InputBuffer {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0.0f32; RGB_CHANNELS * height * width].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 张量形状 [1, C, H, W]
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  /// 第 `c` 个通道的平面
  pub fn plane(&self, c: usize) -> &[f32] {
    let size = self.height * self.width;
    &self.data[c * size..(c + 1) * size]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

impl AsMut<[f32]> for InputBuffer {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bgra_pixels_are_read_as_rgb() {
    assert_eq!(PixelFormat::Bgra8.rgb_at(&[1, 2, 3, 255]), [3, 2, 1]);
    assert_eq!(PixelFormat::Rgba8.rgb_at(&[1, 2, 3, 255]), [1, 2, 3]);
  }

  #[test]
  fn expected_len_accounts_for_pixel_size() {
    let data = [0u8; 0];
    let frame = Frame::new(4, 2, PixelFormat::Rgba8, &data);
    assert_eq!(frame.expected_len(), Some(32));
    assert!(!frame.is_empty());
    assert!(Frame::new(0, 2, PixelFormat::Rgb8, &data).is_empty());
  }

  #[test]
  fn input_buffer_planes_are_contiguous() {
    let mut buffer = InputBuffer::with_shape(2, 3);
    buffer.as_mut()[6] = 1.0;
    assert_eq!(buffer.shape(), [1, 3, 2, 3]);
    assert_eq!(buffer.plane(1)[0], 1.0);
    assert_eq!(buffer.plane(0).len(), 6);
  }
}
