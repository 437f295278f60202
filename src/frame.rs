// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// SSD MobileNet 模型的输入边长
pub const SSD_INPUT_SIZE: u32 = 300;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
}

/// 从显示帧构造模型输入
pub trait FromRgbImage: Sized {
  fn from_rgb_image(image: &RgbImage) -> Result<Self, FrameError>;
}

/// 固定尺寸的 RGB 张量帧，按 NHWC 排布
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  /// 模型读取的原始张量
  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let data = vec![0u8; Self::LEN].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> FromRgbImage for RgbNhwcFrame<W, H> {
  // 双线性缩放到模型输入尺寸
  fn from_rgb_image(image: &RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }

    let raw = if (width, height) == (W, H) {
      image.as_raw().clone()
    } else {
      imageops::resize(image, W, H, FilterType::Triangle).into_raw()
    };

    Self::try_from(raw)
  }
}
