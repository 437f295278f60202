// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 标签表
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

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
  str::FromStr,
};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 类别序号到名称的映射，每行一个标签
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl LabelTable {
  pub fn new(labels: Vec<String>) -> Self {
    Self { labels }
  }

  /// 逐行读取标签，空白行不占用序号
  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LabelTableError> {
    let mut labels = Vec::new();
    for line in reader.lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      labels.push(line);
    }
    debug!("读取到 {} 个标签", labels.len());
    Ok(Self { labels })
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelTableError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let file = File::open(path)?;
    Self::from_reader(BufReader::new(file))
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl FromStr for LabelTable {
  type Err = LabelTableError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_reader(s.as_bytes())
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self::new(iter.into_iter().map(Into::into).collect())
  }
}
