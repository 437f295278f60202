// 该文件是 Kanjian （看见） 项目的一部分。
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::CameraProvider,
  utils::{query_value, url_file_path},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid path: {0}")]
  InvalidPath(#[from] std::string::FromUtf8Error),
  #[error("Invalid repeat count: {0}")]
  InvalidRepeat(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 把一张静态图片当作摄像头，重复输出 `repeat` 次
pub struct ImageFileInput {
  image: RgbImage,
  repeat: usize,
  remaining: usize,
}

impl ImageFileInput {
  pub fn new(image: RgbImage, repeat: usize) -> Self {
    Self {
      image,
      repeat,
      remaining: 0,
    }
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let repeat = match query_value(url, "repeat") {
      Some(value) => value
        .parse::<usize>()
        .map_err(|_| ImageFileInputError::InvalidRepeat(value))?,
      None => 1,
    };

    let path = url_file_path(url)?;
    let image = ImageReader::open(&path)?.decode()?;
    info!("读取图像文件: {}", path.display());

    Ok(ImageFileInput::new(image.into_rgb8(), repeat))
  }
}

impl CameraProvider for ImageFileInput {
  type Error = ImageFileInputError;

  fn resolution(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  fn open(&mut self) -> Result<(), Self::Error> {
    self.remaining = self.repeat;
    Ok(())
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, Self::Error>> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(Ok(self.image.clone()))
  }

  fn close(&mut self) {
    self.remaining = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn repeats_the_still_after_open() {
    let mut input = ImageFileInput::new(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])), 2);
    assert_eq!(input.resolution(), (4, 3));
    assert!(input.next_frame().is_none());

    input.open().unwrap();
    assert!(input.next_frame().is_some());
    assert!(input.next_frame().is_some());
    assert!(input.next_frame().is_none());
  }

  #[test]
  fn close_stops_delivery() {
    let mut input = ImageFileInput::new(RgbImage::new(1, 1), 5);
    input.open().unwrap();
    input.close();
    assert!(input.next_frame().is_none());
  }

  #[test]
  fn reads_repeat_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(8, 6, Rgb([9, 9, 9])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=3", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.resolution(), (8, 6));
    input.open().unwrap();
    assert_eq!(std::iter::from_fn(|| input.next_frame()).count(), 3);

    let bad = Url::parse(&format!("image://{}?repeat=many", path.display())).unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&bad),
      Err(ImageFileInputError::InvalidRepeat(_))
    ));
  }
}
