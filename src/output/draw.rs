// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/output/draw.rs - 检测框可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as PixelRect};

use crate::{frame::OwnedFrame, model::Detection};

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 检测框本身不裁剪，只在绘制时限制到图像范围内
  pub fn draw_box(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let rect = detection.rect;

    let x_min = (rect.x.floor() as i32).clamp(0, w - 1);
    let y_min = (rect.y.floor() as i32).clamp(0, h - 1);
    let x_max = (rect.x_max().ceil() as i32).clamp(0, w - 1);
    let y_max = (rect.y_max().ceil() as i32).clamp(0, h - 1);

    // 向内加粗
    for t in 0..self.thickness {
      let (x0, y0) = (x_min + t, y_min + t);
      let (x1, y1) = (x_max - t, y_max - t);
      if x0 >= x1 || y0 >= y1 {
        break;
      }
      let outline = PixelRect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
      draw_hollow_rect_mut(image, outline, Rgb(self.color));
    }
  }

  pub fn draw_detection(&self, frame: &OwnedFrame, detection: &Detection) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_box(&mut image, detection);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Rect;

  #[test]
  fn box_is_drawn_inside_the_image() {
    let frame = OwnedFrame::from(RgbImage::new(20, 10));
    let detection = Detection {
      confidence: 0.9,
      rect: Rect::new(2.0, 2.0, 6.0, 4.0),
    };
    let image = Draw::default().draw_detection(&frame, &detection);

    assert_eq!(image.get_pixel(2, 2).0, BOX_COLOR);
    assert_eq!(image.get_pixel(8, 6).0, BOX_COLOR);
    assert_eq!(image.get_pixel(5, 4).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(15, 8).0, [0, 0, 0]);
  }

  #[test]
  fn box_larger_than_the_image_is_clipped_when_drawn() {
    let frame = OwnedFrame::from(RgbImage::new(8, 8));
    let detection = Detection {
      confidence: 0.9,
      rect: Rect::new(-50.0, -50.0, 500.0, 500.0),
    };
    let image = Draw::default().draw_detection(&frame, &detection);
    assert_eq!(image.get_pixel(0, 0).0, BOX_COLOR);
    assert_eq!(image.get_pixel(7, 7).0, BOX_COLOR);
    assert_eq!(image.get_pixel(4, 4).0, [0, 0, 0]);
  }
}
