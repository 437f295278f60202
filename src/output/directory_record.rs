// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{cell::Cell, path::PathBuf};

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    draw::{Overlay, Record},
  },
  utils::{has_query_key, url_file_path},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径解码错误: {0}")]
  InvalidPath(#[from] std::string::FromUtf8Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存帧。
///
/// - 默认保存叠加了检测结果的帧；
/// - `?record` 保存原始帧，并在旁边写入同名 `.txt` 检测记录；
/// - `?always` 连没有检测的帧也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<Record>,
  frame_counter: Cell<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: url_file_path(uri)?,
      record: has_query_key(uri, "record").then_some(Record),
      frame_counter: Cell::new(0),
      always: has_query_key(uri, "always"),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let id = self.frame_counter.get().wrapping_add(1);
    self.frame_counter.set(id);
    id
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, Overlay> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &Overlay) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("无检测结果，跳过保存");
      return Ok(());
    }

    let path = self.frame_path(Utc::now())?;
    match &self.record {
      Some(record) => {
        frame.save(&path)?;
        record.record(result, &path)?;
      }
      None => result.image.save(&path)?,
    }
    debug!("保存帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    label::LabelTable,
    model::{Detection, InferenceResult},
    output::draw::OverlayRenderer,
  };
  use image::Rgb;
  use url::Url;

  fn files_with_extension(root: &std::path::Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn overlay(score: f32) -> (RgbImage, Overlay) {
    let frame = RgbImage::from_pixel(50, 50, Rgb([10, 10, 10]));
    let result = InferenceResult::from_detections(&[Detection {
      top: 0.2,
      left: 0.2,
      bottom: 0.8,
      right: 0.8,
      class_index: 0,
      score,
    }]);
    let labels: LabelTable = ["dog"].into_iter().collect();
    let overlay = OverlayRenderer::builder()
      .build()
      .unwrap()
      .render(&frame, &result, &labels);
    (frame, overlay)
  }

  #[test]
  fn skips_frames_without_detections_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let (frame, empty) = overlay(0.1);
    output.render_result(&frame, &empty).unwrap();
    assert!(files_with_extension(dir.path(), "png").is_empty());

    let (frame, hit) = overlay(0.9);
    output.render_result(&frame, &hit).unwrap();
    let saved = files_with_extension(dir.path(), "png");
    assert_eq!(saved.len(), 1);
    assert_eq!(image::open(&saved[0]).unwrap().into_rgb8(), hit.image);
  }

  #[test]
  fn always_keeps_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let (frame, empty) = overlay(0.1);
    output.render_result(&frame, &empty).unwrap();
    output.render_result(&frame, &empty).unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 2);
  }

  #[test]
  fn record_mode_saves_raw_frame_and_detections() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let (frame, hit) = overlay(0.9);
    output.render_result(&frame, &hit).unwrap();

    let saved = files_with_extension(dir.path(), "png");
    assert_eq!(saved.len(), 1);
    assert_eq!(image::open(&saved[0]).unwrap().into_rgb8(), frame);

    let records = files_with_extension(dir.path(), "txt");
    assert_eq!(records.len(), 1);
    let text = std::fs::read_to_string(&records[0]).unwrap();
    assert!(text.starts_with("dog, 0.9000"));
  }

  #[test]
  fn frame_ids_increase() {
    let output = DirectoryRecordOutput {
      directory: PathBuf::new(),
      record: None,
      frame_counter: Cell::new(u16::MAX - 1),
      always: false,
    };
    assert_eq!(output.frame_id(), u16::MAX);
    assert_eq!(output.frame_id(), 0);
  }
}
