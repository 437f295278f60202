// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::{fmt, path::Path, str::FromStr};

use ab_glyph::{Font, FontArc, InvalidFont, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  label::LabelTable,
  model::{Detection, InferenceResult},
};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// 按检测序号循环使用的颜色
pub const DEFAULT_PALETTE: [Rgb<u8>; 10] = [
  Rgb([0, 0, 255]),     // 蓝
  Rgb([0, 255, 0]),     // 绿
  Rgb([255, 0, 0]),     // 红
  Rgb([0, 255, 255]),   // 青
  Rgb([136, 136, 136]), // 灰
  Rgb([0, 0, 0]),       // 黑
  Rgb([68, 68, 68]),    // 深灰
  Rgb([255, 0, 255]),   // 品红
  Rgb([255, 255, 0]),   // 黄
  Rgb([255, 0, 0]),     // 红
];

// 字号与线宽都按帧高度的比例计算
const TEXT_SIZE_DIVISOR: f32 = 15.0;
const STROKE_WIDTH_DIVISOR: f32 = 85.0;

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("调色板不能为空")]
  EmptyPalette,
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("字体加载失败: {0}")]
  FontError(#[from] InvalidFont),
  #[error("未知的坐标还原方式: {0}")]
  UnknownDenormalization(String),
}

/// 归一化坐标还原到像素坐标的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Denormalization {
  /// 左右乘帧宽，上下乘帧高
  #[default]
  FrameSize,
  /// 矩形左边乘展开数组下标 `4 * i`，复现参考实现的行为；标签位置不受影响
  FlattenedIndex,
}

impl FromStr for Denormalization {
  type Err = OverlayError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "frame-size" => Ok(Denormalization::FrameSize),
      "flattened-index" => Ok(Denormalization::FlattenedIndex),
      other => Err(OverlayError::UnknownDenormalization(other.to_string())),
    }
  }
}

impl fmt::Display for Denormalization {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Denormalization::FrameSize => write!(f, "frame-size"),
      Denormalization::FlattenedIndex => write!(f, "flattened-index"),
    }
  }
}

/// 被跳过的检测
#[derive(Debug, Clone, PartialEq)]
pub enum RenderWarning {
  InvalidClassIndex {
    index: usize,
    class_index: i64,
    labels: usize,
  },
  MalformedDetection {
    index: usize,
  },
}

impl fmt::Display for RenderWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RenderWarning::InvalidClassIndex {
        index,
        class_index,
        labels,
      } => write!(
        f,
        "检测 {} 的类别序号 {} 超出标签表范围 (共 {} 个标签)",
        index, class_index, labels
      ),
      RenderWarning::MalformedDetection { index } => {
        write!(f, "检测 {} 含有非有限数值", index)
      }
    }
  }
}

/// 像素坐标下的矩形，可能超出帧边界
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

/// 已绘制到帧上的检测
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnDetection {
  pub index: usize,
  pub detection: Detection,
  pub label: String,
  pub text: String,
  pub rect: PixelRect,
  pub color: Rgb<u8>,
}

/// 一次渲染的结果
#[derive(Debug, Clone)]
pub struct Overlay {
  pub image: RgbImage,
  pub drawn: Vec<DrawnDetection>,
  pub warnings: Vec<RenderWarning>,
}

impl Overlay {
  pub fn is_empty(&self) -> bool {
    self.drawn.is_empty()
  }
}

pub struct OverlayRendererBuilder {
  font: Option<FontArc>,
  palette: Vec<Rgb<u8>>,
  threshold: f32,
  denormalization: Denormalization,
}

impl Default for OverlayRendererBuilder {
  fn default() -> Self {
    Self {
      font: None,
      palette: DEFAULT_PALETTE.to_vec(),
      threshold: DEFAULT_SCORE_THRESHOLD,
      denormalization: Denormalization::default(),
    }
  }
}

impl OverlayRendererBuilder {
  pub fn font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn palette(mut self, palette: Vec<Rgb<u8>>) -> Self {
    self.palette = palette;
    self
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn denormalization(mut self, denormalization: Denormalization) -> Self {
    self.denormalization = denormalization;
    self
  }

  pub fn build(self) -> Result<OverlayRenderer, OverlayError> {
    if self.palette.is_empty() {
      return Err(OverlayError::EmptyPalette);
    }
    if !self.threshold.is_finite() {
      return Err(OverlayError::InvalidThreshold(self.threshold));
    }

    let font = match self.font {
      Some(font) => font,
      None => FontArc::try_from_slice(DEFAULT_FONT)?,
    };

    Ok(OverlayRenderer {
      font,
      palette: self.palette.into_boxed_slice(),
      threshold: self.threshold,
      denormalization: self.denormalization,
    })
  }
}

/// 在帧的副本上绘制检测框和标签
pub struct OverlayRenderer {
  font: FontArc,
  palette: Box<[Rgb<u8>]>,
  threshold: f32,
  denormalization: Denormalization,
}

impl OverlayRenderer {
  pub fn builder() -> OverlayRendererBuilder {
    OverlayRendererBuilder::default()
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn denormalization(&self) -> Denormalization {
    self.denormalization
  }

  pub fn color_for(&self, index: usize) -> Rgb<u8> {
    self.palette[index % self.palette.len()]
  }

  /// 分数严格大于阈值的检测按序号升序绘制，后绘制的覆盖先绘制的。
  /// 类别序号无效或数值非有限的检测被跳过并记录在 `warnings` 中。
  pub fn render(&self, frame: &RgbImage, result: &InferenceResult, labels: &LabelTable) -> Overlay {
    let mut image = frame.clone();
    let mut drawn = Vec::new();
    let mut warnings = Vec::new();

    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
      debug!("空帧，跳过绘制");
      return Overlay {
        image,
        drawn,
        warnings,
      };
    }

    let (w, h) = (w as f32, h as f32);
    let scale = PxScale::from(h / TEXT_SIZE_DIVISOR);
    let stroke = (h / STROKE_WIDTH_DIVISOR).round().max(1.0) as i32;

    for (index, det) in result.detections().enumerate() {
      if det.score.is_nan() || det.score <= self.threshold {
        continue;
      }

      if !det.is_finite() {
        let warning = RenderWarning::MalformedDetection { index };
        warn!("{}", warning);
        warnings.push(warning);
        continue;
      }

      let label = match usize::try_from(det.class_index)
        .ok()
        .and_then(|class| labels.get(class))
      {
        Some(label) => label,
        None => {
          let warning = RenderWarning::InvalidClassIndex {
            index,
            class_index: det.class_index,
            labels: labels.len(),
          };
          warn!("{}", warning);
          warnings.push(warning);
          continue;
        }
      };

      let color = self.color_for(index);
      let rect = self.denormalize(index, &det, w, h);
      draw_stroked_rect(&mut image, &rect, stroke, color);

      let text = format!("{} {}", label, det.score);
      self.draw_label(&mut image, &text, det.left * w, det.top * h, scale, color);

      drawn.push(DrawnDetection {
        index,
        detection: det,
        label: label.to_string(),
        text,
        rect,
        color,
      });
    }

    debug!("绘制 {} 个检测，跳过 {} 个", drawn.len(), warnings.len());

    Overlay {
      image,
      drawn,
      warnings,
    }
  }

  fn denormalize(&self, index: usize, det: &Detection, w: f32, h: f32) -> PixelRect {
    let left = match self.denormalization {
      Denormalization::FrameSize => det.left * w,
      Denormalization::FlattenedIndex => det.left * (index * 4) as f32,
    };

    PixelRect {
      left,
      top: det.top * h,
      right: det.right * w,
      bottom: det.bottom * h,
    }
  }

  // 文字基线落在 (x, y)，超出上边界时下移
  fn draw_label(&self, image: &mut RgbImage, text: &str, x: f32, y: f32, scale: PxScale, color: Rgb<u8>) {
    let ascent = self.font.as_scaled(scale).ascent();
    let (w, h) = image.dimensions();
    let x = x.round().clamp(0.0, w as f32) as i32;
    let y = (y - ascent).round().clamp(0.0, h as f32) as i32;
    draw_text_mut(image, color, x, y, scale, &self.font, text);
  }
}

// 线宽以矩形边为中心向内外扩展；边先收拢到帧外一个线宽以内，避免整数溢出
fn draw_stroked_rect(image: &mut RgbImage, rect: &PixelRect, stroke: i32, color: Rgb<u8>) {
  let (w, h) = image.dimensions();
  let margin = stroke as f32;
  let to_x = |v: f32| v.round().clamp(-margin, w as f32 + margin) as i32;
  let to_y = |v: f32| v.round().clamp(-margin, h as f32 + margin) as i32;

  let (x0, x1) = ordered(to_x(rect.left), to_x(rect.right));
  let (y0, y1) = ordered(to_y(rect.top), to_y(rect.bottom));

  for k in 0..stroke {
    let offset = k - stroke / 2;
    let (left, top) = (x0 + offset, y0 + offset);
    let (right, bottom) = (x1 - offset, y1 - offset);
    if right < left || bottom < top {
      continue;
    }

    let outline = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
    draw_hollow_rect_mut(image, outline, color);
  }
}

fn ordered(a: i32, b: i32) -> (i32, i32) {
  if a <= b { (a, b) } else { (b, a) }
}

/// 把检测结果记录为文本文件，每行一个检测
pub struct Record;

impl Record {
  pub fn record(&self, overlay: &Overlay, path: &Path) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    for item in overlay.drawn.iter() {
      let [top, left, bottom, right] = item.detection.bbox();
      let record = format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        item.label, item.detection.score, top, left, bottom, right
      );
      records.push(record);
    }
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn renderer() -> OverlayRenderer {
    OverlayRenderer::builder().build().unwrap()
  }

  fn det(top: f32, left: f32, bottom: f32, right: f32, class_index: i64, score: f32) -> Detection {
    Detection {
      top,
      left,
      bottom,
      right,
      class_index,
      score,
    }
  }

  fn gray_frame() -> RgbImage {
    RgbImage::from_pixel(100, 100, Rgb([200, 200, 200]))
  }

  fn cat() -> LabelTable {
    ["cat"].into_iter().collect()
  }

  #[test]
  fn draws_box_and_label_above_threshold() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[det(0.1, 0.1, 0.9, 0.9, 0, 0.9)]);
    let overlay = renderer().render(&frame, &result, &cat());

    assert_eq!(overlay.image.dimensions(), frame.dimensions());
    assert_eq!(overlay.drawn.len(), 1);
    let drawn = &overlay.drawn[0];
    assert_eq!(drawn.text, "cat 0.9");
    assert_eq!(
      drawn.rect,
      PixelRect {
        left: 10.0,
        top: 10.0,
        right: 90.0,
        bottom: 90.0
      }
    );

    let blue = DEFAULT_PALETTE[0];
    assert_eq!(*overlay.image.get_pixel(90, 50), blue);
    assert_eq!(*overlay.image.get_pixel(50, 90), blue);
    assert_eq!(*overlay.image.get_pixel(10, 50), blue);
    assert_eq!(*overlay.image.get_pixel(50, 50), Rgb([200, 200, 200]));

    // 标签文字画在左上角上方
    let background = Rgb([200, 200, 200]);
    let near_corner =
      (10..40).any(|x| (0..10).any(|y| *overlay.image.get_pixel(x, y) != background));
    assert!(near_corner);

    // 输入帧保持不变
    assert_eq!(frame, gray_frame());
  }

  #[test]
  fn below_threshold_leaves_frame_untouched() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[det(0.1, 0.1, 0.9, 0.9, 0, 0.4)]);
    let overlay = renderer().render(&frame, &result, &cat());

    assert!(overlay.is_empty());
    assert!(overlay.warnings.is_empty());
    assert_eq!(overlay.image, frame);
  }

  #[test]
  fn score_equal_to_threshold_is_not_drawn() {
    let frame = gray_frame();
    for threshold in [0.0, 0.25, 0.5, 0.75] {
      let renderer = OverlayRenderer::builder().threshold(threshold).build().unwrap();
      let result = InferenceResult::from_detections(&[
        det(0.1, 0.1, 0.9, 0.9, 0, threshold),
        det(0.2, 0.2, 0.8, 0.8, 0, threshold - 0.1),
      ]);
      let overlay = renderer.render(&frame, &result, &cat());
      assert_eq!(overlay.image, frame, "threshold {}", threshold);
    }
  }

  #[test]
  fn rendering_is_idempotent() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
      det(0.3, 0.2, 0.6, 0.7, 0, 0.8),
    ]);
    let renderer = renderer();
    let a = renderer.render(&frame, &result, &cat());
    let b = renderer.render(&frame, &result, &cat());
    assert_eq!(a.image, b.image);
    assert_eq!(a.drawn, b.drawn);
  }

  #[test]
  fn colors_cycle_through_palette() {
    let frame = gray_frame();
    let dets: Vec<_> = (0..23).map(|_| det(0.1, 0.1, 0.9, 0.9, 0, 0.9)).collect();
    let overlay = renderer().render(&frame, &InferenceResult::from_detections(&dets), &cat());

    assert_eq!(overlay.drawn.len(), 23);
    for drawn in &overlay.drawn {
      assert_eq!(drawn.color, DEFAULT_PALETTE[drawn.index % DEFAULT_PALETTE.len()]);
    }
  }

  #[test]
  fn color_follows_detection_index_not_drawn_count() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.9, 0.9, 0, 0.1),
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
    ]);
    let overlay = renderer().render(&frame, &result, &cat());
    assert_eq!(overlay.drawn[0].index, 1);
    assert_eq!(overlay.drawn[0].color, DEFAULT_PALETTE[1]);
  }

  #[test]
  fn later_detection_draws_on_top() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
      det(0.1, 0.1, 0.9, 0.9, 0, 0.8),
    ]);
    let overlay = renderer().render(&frame, &result, &cat());
    assert_eq!(*overlay.image.get_pixel(90, 50), DEFAULT_PALETTE[1]);
    assert_eq!(*overlay.image.get_pixel(50, 90), DEFAULT_PALETTE[1]);
  }

  #[test]
  fn invalid_class_index_is_skipped_with_warning() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.5, 0.5, 7, 0.9),
      det(0.5, 0.5, 0.9, 0.9, 0, 0.9),
      det(0.2, 0.2, 0.3, 0.3, -1, 0.9),
    ]);
    let overlay = renderer().render(&frame, &result, &cat());

    assert_eq!(overlay.drawn.len(), 1);
    assert_eq!(overlay.drawn[0].index, 1);
    assert_eq!(
      overlay.warnings,
      vec![
        RenderWarning::InvalidClassIndex {
          index: 0,
          class_index: 7,
          labels: 1
        },
        RenderWarning::InvalidClassIndex {
          index: 2,
          class_index: -1,
          labels: 1
        },
      ]
    );
  }

  #[test]
  fn empty_label_table_skips_everything() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[det(0.1, 0.1, 0.9, 0.9, 0, 0.9)]);
    let overlay = renderer().render(&frame, &result, &LabelTable::default());
    assert_eq!(overlay.image, frame);
    assert_eq!(overlay.warnings.len(), 1);
  }

  #[test]
  fn non_finite_coordinates_are_skipped() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[det(f32::NAN, 0.1, 0.9, 0.9, 0, 0.9)]);
    let overlay = renderer().render(&frame, &result, &cat());
    assert_eq!(overlay.image, frame);
    assert_eq!(overlay.warnings, vec![RenderWarning::MalformedDetection { index: 0 }]);
  }

  #[test]
  fn flattened_index_scales_rectangle_left_by_array_offset() {
    let frame = gray_frame();
    let renderer = OverlayRenderer::builder()
      .denormalization(Denormalization::FlattenedIndex)
      .build()
      .unwrap();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
    ]);
    let overlay = renderer.render(&frame, &result, &cat());

    assert_eq!(overlay.drawn[0].rect.left, 0.0);
    assert_eq!(overlay.drawn[1].rect.left, 0.4);
    assert_eq!(overlay.drawn[1].rect.right, 90.0);
    assert_eq!(*overlay.image.get_pixel(0, 50), DEFAULT_PALETTE[1]);
  }

  #[test]
  fn boxes_past_the_frame_are_clipped() {
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[det(-0.5, -0.5, 1.5, 1.5, 0, 0.9)]);
    let overlay = renderer().render(&frame, &result, &cat());
    assert_eq!(overlay.image.dimensions(), (100, 100));
    assert_eq!(overlay.drawn.len(), 1);
  }

  #[test]
  fn huge_finite_boxes_are_drawn_without_overflow() {
    let frame = gray_frame();
    let background = Rgb([200, 200, 200]);

    let wide = InferenceResult::from_detections(&[det(0.1, 0.0, 0.9, 1.0e8, 0, 0.9)]);
    let overlay = renderer().render(&frame, &wide, &cat());
    assert_eq!(overlay.drawn.len(), 1);
    assert_eq!(*overlay.image.get_pixel(0, 50), DEFAULT_PALETTE[0]);
    assert_eq!(*overlay.image.get_pixel(99, 50), background);
    assert_eq!(*overlay.image.get_pixel(50, 90), DEFAULT_PALETTE[0]);

    let everywhere = InferenceResult::from_detections(&[det(-1.0e9, -1.0e9, 1.0e9, 1.0e9, 0, 0.9)]);
    let overlay = renderer().render(&frame, &everywhere, &cat());
    assert_eq!(overlay.drawn.len(), 1);
    assert!(overlay.warnings.is_empty());
    assert_eq!(*overlay.image.get_pixel(50, 50), background);
    assert_eq!(*overlay.image.get_pixel(99, 99), background);
  }

  #[test]
  fn empty_palette_is_rejected() {
    assert!(matches!(
      OverlayRenderer::builder().palette(Vec::new()).build(),
      Err(OverlayError::EmptyPalette)
    ));
  }

  #[test]
  fn parses_denormalization_names() {
    assert_eq!("frame-size".parse::<Denormalization>().unwrap(), Denormalization::FrameSize);
    assert_eq!(
      "flattened-index".parse::<Denormalization>().unwrap(),
      Denormalization::FlattenedIndex
    );
    assert!("index".parse::<Denormalization>().is_err());
    assert_eq!(Denormalization::FlattenedIndex.to_string(), "flattened-index");
  }

  #[test]
  fn record_writes_one_line_per_drawn_detection() {
    let dir = tempfile::tempdir().unwrap();
    let frame = gray_frame();
    let result = InferenceResult::from_detections(&[
      det(0.1, 0.1, 0.9, 0.9, 0, 0.9),
      det(0.1, 0.1, 0.9, 0.9, 0, 0.2),
    ]);
    let overlay = renderer().render(&frame, &result, &cat());
    let path = dir.path().join("frame.png");
    Record.record(&overlay, &path).unwrap();

    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert_eq!(text, "cat, 0.9000, 0.1000, 0.1000, 0.9000, 0.9000");
  }
}
