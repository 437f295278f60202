// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 帧来源（摄像头）
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
use thiserror::Error;

use crate::FromUrl;

/// 按需提供帧的摄像头。只有在被请求时才产生下一帧，不做缓冲。
pub trait CameraProvider {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 帧的宽高
  fn resolution(&self) -> (u32, u32);
  fn open(&mut self) -> Result<(), Self::Error>;
  fn next_frame(&mut self) -> Option<Result<RgbImage, Self::Error>>;
  fn close(&mut self);
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_image_file")]
mod image_folder;
#[cfg(feature = "read_image_file")]
pub use self::image_folder::{ImageFolderInput, ImageFolderInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image folder input error: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageFolder(ImageFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
      if url.scheme() == ImageFolderInput::SCHEME {
        let input = ImageFolderInput::from_url(url)?;
        return Ok(InputWrapper::ImageFolder(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl CameraProvider for InputWrapper {
  type Error = InputError;

  fn resolution(&self) -> (u32, u32) {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.resolution(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFolder(input) => input.resolution(),
    }
  }

  fn open(&mut self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.open().map_err(InputError::from),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFolder(input) => input.open().map_err(InputError::from),
    }
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, Self::Error>> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input
        .next_frame()
        .map(|frame| frame.map_err(InputError::from)),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFolder(input) => input
        .next_frame()
        .map(|frame| frame.map_err(InputError::from)),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.close(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFolder(input) => input.close(),
    }
  }
}
