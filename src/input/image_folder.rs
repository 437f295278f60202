// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/image_folder.rs - 图像目录输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::CameraProvider, utils::url_file_path};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid path: {0}")]
  InvalidPath(#[from] std::string::FromUtf8Error),
  #[error("No frames found in {0}")]
  EmptyFolder(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 把目录中的图片按文件名顺序当作连续的摄像头帧
pub struct ImageFolderInput {
  directory: PathBuf,
  frames: Vec<PathBuf>,
  resolution: (u32, u32),
  cursor: Option<usize>,
}

fn is_frame_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
}

impl ImageFolderInput {
  pub fn with_directory(directory: impl Into<PathBuf>) -> Result<Self, ImageFolderInputError> {
    let directory = directory.into();
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if is_frame_file(&path) {
        frames.push(path);
      }
    }
    frames.sort();

    let resolution = match frames.first() {
      Some(first) => image::image_dimensions(first)?,
      None => (0, 0),
    };

    info!(
      "图像目录 {}: {} 帧, {}x{}",
      directory.display(),
      frames.len(),
      resolution.0,
      resolution.1
    );

    Ok(Self {
      directory,
      frames,
      resolution,
      cursor: None,
    })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFolderInputError::SchemaMismatch);
    }

    Self::with_directory(url_file_path(url)?)
  }
}

impl CameraProvider for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn resolution(&self) -> (u32, u32) {
    self.resolution
  }

  fn open(&mut self) -> Result<(), Self::Error> {
    if self.frames.is_empty() {
      return Err(ImageFolderInputError::EmptyFolder(self.directory.clone()));
    }
    self.cursor = Some(0);
    Ok(())
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, Self::Error>> {
    let index = self.cursor?;
    let path = self.frames.get(index)?;
    self.cursor = Some(index + 1);
    debug!("读取帧 {}", path.display());

    let frame = ImageReader::open(path)
      .map_err(ImageFolderInputError::from)
      .and_then(|reader| reader.decode().map_err(ImageFolderInputError::from))
      .map(|image| image.into_rgb8());
    Some(frame)
  }

  fn close(&mut self) {
    self.cursor = None;
  }
}
