// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::OwnedFrame, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image found in directory: {0}")]
  EmptyDirectory(PathBuf),
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

fn load_frame(path: &Path) -> Result<OwnedFrame, ImageFileInputError> {
  let image = ImageReader::open(path)?.decode()?;
  Ok(OwnedFrame::from(image.to_rgb8()))
}

fn check_scheme(url: &Url, scheme: &str) -> Result<(), ImageFileInputError> {
  if url.scheme() != scheme {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      scheme,
      url.scheme()
    );
    return Err(ImageFileInputError::SchemaMismatch);
  }
  Ok(())
}

/// 单张图像，只产生一帧
pub struct ImageFileInput {
  frame: Option<OwnedFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let frame = load_frame(&url_file_path(url))?;
    info!("读取图像: {}x{}", frame.width, frame.height);
    Ok(ImageFileInput { frame: Some(frame) })
  }
}

impl Iterator for ImageFileInput {
  type Item = OwnedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

/// 按文件名顺序回放目录中的图像序列；无法解码的文件会被跳过
pub struct ImageDirectoryInput {
  paths: std::vec::IntoIter<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let dir = url_file_path(url);
    Self::open(&dir)
  }
}

impl ImageDirectoryInput {
  pub fn open(dir: &Path) -> Result<Self, ImageFileInputError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
      if is_image {
        paths.push(path);
      }
    }
    if paths.is_empty() {
      return Err(ImageFileInputError::EmptyDirectory(dir.to_path_buf()));
    }
    paths.sort();
    info!("目录 {} 中共有 {} 张图像", dir.display(), paths.len());

    Ok(Self {
      paths: paths.into_iter(),
      index: 0,
    })
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = OwnedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.paths.by_ref() {
      match load_frame(&path) {
        Ok(frame) => {
          let index = self.index;
          self.index += 1;
          return Some(frame.with_index(index));
        }
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn directory_frames_come_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::new(4, 2).save(dir.path().join("b.png")).unwrap();
    image::RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("c.png"), b"not an image").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let frames: Vec<OwnedFrame> = ImageDirectoryInput::open(dir.path()).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].width, frames[0].index), (2, 0));
    assert_eq!((frames[1].width, frames[1].index), (4, 1));
  }

  #[test]
  fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageDirectoryInput::open(dir.path()),
      Err(ImageFileInputError::EmptyDirectory(_))
    ));
  }

  #[test]
  fn single_image_yields_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plate.png");
    image::RgbImage::new(3, 5).save(&path).unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();

    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next().unwrap();
    assert_eq!((frame.width, frame.height), (3, 5));
    assert!(input.next().is_none());
  }
}
