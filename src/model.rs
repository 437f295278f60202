// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;

  /// 释放模型资源
  fn close(self)
  where
    Self: Sized,
  {
  }
}

/// 单个检测结果，坐标为归一化值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub top: f32,
  pub left: f32,
  pub bottom: f32,
  pub right: f32,
  /// 负数表示模型给出的类别无法解读
  pub class_index: i64,
  pub score: f32,
}

impl Detection {
  /// [top, left, bottom, right]
  pub fn bbox(&self) -> [f32; 4] {
    [self.top, self.left, self.bottom, self.right]
  }

  pub fn is_finite(&self) -> bool {
    self.bbox().iter().all(|v| v.is_finite()) && self.score.is_finite()
  }
}

/// 模型的原始输出：并列数组，每个检测占 4 个坐标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
  pub locations: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  #[serde(default)]
  pub count: Option<f32>,
}

impl InferenceResult {
  pub fn from_detections(detections: &[Detection]) -> Self {
    let mut result = InferenceResult {
      locations: Vec::with_capacity(detections.len() * 4),
      classes: Vec::with_capacity(detections.len()),
      scores: Vec::with_capacity(detections.len()),
      count: Some(detections.len() as f32),
    };
    for det in detections {
      result.locations.extend_from_slice(&det.bbox());
      result.classes.push(det.class_index as f32);
      result.scores.push(det.score);
    }
    result
  }

  /// 有效的检测数量，不超过任何一个数组的长度
  pub fn len(&self) -> usize {
    let available = self
      .scores
      .len()
      .min(self.classes.len())
      .min(self.locations.len() / 4);

    match self.count {
      Some(count) if count.is_finite() && count >= 0.0 => available.min(count as usize),
      _ => available,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, index: usize) -> Option<Detection> {
    if index >= self.len() {
      return None;
    }

    let loc = &self.locations[index * 4..index * 4 + 4];
    let class = self.classes[index];
    Some(Detection {
      top: loc[0],
      left: loc[1],
      bottom: loc[2],
      right: loc[3],
      class_index: if class.is_finite() {
        class.trunc() as i64
      } else {
        -1
      },
      score: self.scores[index],
    })
  }

  /// 按模型输出顺序遍历
  pub fn detections(&self) -> impl Iterator<Item = Detection> + '_ {
    (0..self.len()).filter_map(move |i| self.get(i))
  }
}

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError, SsdReplayModel};
