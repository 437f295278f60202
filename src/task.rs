// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 任务循环
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  context::DetectionContext,
  frame::FromRgbImage,
  input::CameraProvider,
  model::{InferenceResult, Model},
  output::{Render, draw::Overlay},
};

pub trait Task<M, P, O>: Sized {
  type Error;
  fn run_task(self, context: DetectionContext<M, P>, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<M, P, RE, O> Task<M, P, O> for OneShotTask
where
  M: Model<Output = InferenceResult>,
  M::Input: FromRgbImage,
  M::Error: std::error::Error + Send + Sync + 'static,
  P: CameraProvider,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<RgbImage, Overlay, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut context: DetectionContext<M, P>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let result = (|| -> anyhow::Result<()> {
      context.start()?;
      let now = Instant::now();
      let processed = context
        .next_frame()
        .ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
      info!(
        "推理完成，耗时: {:.2?}，绘制 {} 个检测",
        now.elapsed(),
        processed.overlay.drawn.len()
      );
      output.render_result(&processed.frame, &processed.overlay)?;
      info!("渲染完成，耗时: {:.2?}", now.elapsed());
      Ok(())
    })();
    context.shutdown();
    result
  }
}

/// 持续处理帧，直到帧耗尽、达到指定帧数或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理器；每个进程只能安装一次
  pub fn with_interrupt_handler(mut self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    self.interrupt = Some(rx);
    Ok(self)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

impl<M, P, RE, O> Task<M, P, O> for ContinuousTask
where
  M: Model<Output = InferenceResult>,
  M::Input: FromRgbImage,
  M::Error: std::error::Error + Send + Sync + 'static,
  P: CameraProvider,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<RgbImage, Overlay, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut context: DetectionContext<M, P>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let result = (|| -> anyhow::Result<()> {
      context.start()?;

      let mut now = Instant::now();
      while let Some(processed) = context.next_frame() {
        let processed = processed?;
        let elapsed_a = now.elapsed();
        output.render_result(&processed.frame, &processed.overlay)?;
        let elapsed_b = now.elapsed();
        now = Instant::now();
        info!(
          "第 {} 帧: 绘制 {} 个检测，跳过 {} 个，耗时: {:.2?} / {:.2?}",
          processed.index,
          processed.overlay.drawn.len(),
          processed.overlay.warnings.len(),
          elapsed_a,
          elapsed_b
        );

        if self.frame_number.is_some_and(|n| processed.index >= n) {
          info!("达到指定帧数 {}, 退出任务循环", processed.index);
          break;
        }
        if self.interrupted() {
          warn!("中断信号接收，退出任务循环");
          break;
        }
      }
      Ok(())
    })();

    context.shutdown();
    info!("任务完成，退出");
    result
  }
}
