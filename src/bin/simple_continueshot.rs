// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续帧检测叠加
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  context::DetectionContext,
  input::InputWrapper,
  label::LabelTable,
  model::SsdReplayModel,
  output::{
    OutputWrapper,
    draw::{DEFAULT_SCORE_THRESHOLD, Denormalization, OverlayRenderer},
  },
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理记录（replay:///path/to/results.json）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件，每行一个标签
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值，分数需严格大于该值
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,
  /// 坐标还原方式：frame-size 或 flattened-index
  #[arg(long, default_value_t = Denormalization::FrameSize, value_name = "MODE")]
  pub denormalization: Denormalization,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = LabelTable::from_path(&args.labels)?;
  let renderer = OverlayRenderer::builder()
    .threshold(args.threshold)
    .denormalization(args.denormalization)
    .build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let model = SsdReplayModel::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut context = DetectionContext::new(model, labels, renderer, input);
  context.grant_permission();

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt_handler()?
    .run_task(context, output)?;

  Ok(())
}
