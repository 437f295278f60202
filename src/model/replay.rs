// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放模型
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

use std::cell::Cell;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RgbNhwcFrame, SSD_INPUT_SIZE},
  model::{InferenceResult, Model},
  utils::url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("推理记录解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("推理记录为空")]
  EmptyRecording,
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 记录文件可以是单个结果，也可以是结果数组
#[derive(Deserialize)]
#[serde(untagged)]
enum Recording {
  One(InferenceResult),
  Many(Vec<InferenceResult>),
}

/// 依次返回预先录制的推理结果，用尽后从头循环
#[derive(Debug)]
pub struct ReplayModel<const W: u32, const H: u32> {
  results: Box<[InferenceResult]>,
  cursor: Cell<usize>,
}

pub type SsdReplayModel = ReplayModel<SSD_INPUT_SIZE, SSD_INPUT_SIZE>;

impl<const W: u32, const H: u32> ReplayModel<W, H> {
  pub fn new(results: Vec<InferenceResult>) -> Result<Self, ReplayModelError> {
    if results.is_empty() {
      return Err(ReplayModelError::EmptyRecording);
    }
    Ok(Self {
      results: results.into_boxed_slice(),
      cursor: Cell::new(0),
    })
  }

  pub fn from_json(json: &str) -> Result<Self, ReplayModelError> {
    let results = match serde_json::from_str::<Recording>(json)? {
      Recording::One(result) => vec![result],
      Recording::Many(results) => results,
    };
    Self::new(results)
  }

  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ReplayModel<W, H> {
  const SCHEME: &'static str = "replay";
}

impl<const W: u32, const H: u32> FromUrl for ReplayModel<W, H> {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = url_file_path(url)
      .map_err(|e| ReplayModelError::ModelPathError(format!("路径解码失败: {}", e)))?;
    info!("加载推理记录: {}", path.display());
    let json = std::fs::read_to_string(&path)?;
    debug!("推理记录大小: {} 字节", json.len());

    let model = Self::from_json(&json).inspect_err(|e| error!("推理记录无效: {}", e))?;
    info!("模型加载完成，共 {} 条推理结果", model.len());
    Ok(model)
  }
}

impl<const W: u32, const H: u32> Model for ReplayModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = InferenceResult;
  type Error = ReplayModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let index = self.cursor.get();
    self.cursor.set((index + 1) % self.results.len());
    debug!("输入张量 {} 字节，回放第 {} 条推理结果", input.as_nhwc().len(), index);
    Ok(self.results[index].clone())
  }

  fn close(self) {
    info!("回放模型已释放");
  }
}
