// 该文件是 Kanjian （看见） 项目的一部分。
// src/context.rs - 检测上下文
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

use std::sync::mpsc::Sender;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  camera::{CameraAction, CameraEvent, CameraSession, CameraState},
  frame::{FrameError, FromRgbImage},
  input::CameraProvider,
  label::LabelTable,
  model::{InferenceResult, Model},
  output::draw::{Overlay, OverlayRenderer},
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ContextError {
  #[error("帧转换错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("模型推理错误: {0}")]
  ModelError(BoxError),
  #[error("摄像头错误: {0}")]
  CameraError(BoxError),
}

/// 一帧的处理结果：原始帧与叠加了检测结果的帧
pub struct ProcessedFrame {
  pub index: u64,
  pub frame: RgbImage,
  pub overlay: Overlay,
}

/// 持有模型、标签表、渲染器和摄像头会话，所有资源由 [`DetectionContext::shutdown`] 统一释放
pub struct DetectionContext<M, P> {
  model: M,
  labels: LabelTable,
  renderer: OverlayRenderer,
  provider: P,
  session: CameraSession,
  events: Sender<CameraEvent>,
  frame_index: u64,
}

impl<M, P> DetectionContext<M, P>
where
  M: Model<Output = InferenceResult>,
  M::Input: FromRgbImage,
  M::Error: std::error::Error + Send + Sync + 'static,
  P: CameraProvider,
{
  pub fn new(model: M, labels: LabelTable, renderer: OverlayRenderer, provider: P) -> Self {
    let (session, events) = CameraSession::new();
    Self {
      model,
      labels,
      renderer,
      provider,
      session,
      events,
      frame_index: 0,
    }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn renderer(&self) -> &OverlayRenderer {
    &self.renderer
  }

  pub fn camera_state(&self) -> CameraState {
    self.session.state()
  }

  /// 用于从其他线程投递摄像头事件
  pub fn event_sender(&self) -> Sender<CameraEvent> {
    self.events.clone()
  }

  pub fn grant_permission(&mut self) {
    self.post(CameraEvent::PermissionGranted);
    self.pump();
  }

  /// 报告画面表面可用，有权限时打开摄像头
  pub fn start(&mut self) -> Result<(), ContextError> {
    let (width, height) = self.provider.resolution();
    info!("画面表面可用: {}x{}", width, height);
    self.post(CameraEvent::SurfaceAvailable { width, height });
    self.pump_checked()
  }

  /// 缩放到模型输入尺寸，推理，再把结果画在原始帧的副本上
  pub fn process_frame(&self, frame: &RgbImage) -> Result<Overlay, ContextError> {
    let input = <M::Input as FromRgbImage>::from_rgb_image(frame)?;
    let result = self
      .model
      .infer(&input)
      .map_err(|e| ContextError::ModelError(Box::new(e)))?;
    debug!("模型输出 {} 个检测", result.len());
    Ok(self.renderer.render(frame, &result, &self.labels))
  }

  /// 取下一帧并处理；摄像头未处于预览状态或帧已耗尽时返回 `None`
  pub fn next_frame(&mut self) -> Option<Result<ProcessedFrame, ContextError>> {
    if !self.session.is_streaming() {
      return None;
    }

    let frame = match self.provider.next_frame() {
      Some(Ok(frame)) => frame,
      Some(Err(e)) => {
        error!("读取帧失败: {}", e);
        self.post(CameraEvent::DeviceError(-1));
        self.pump();
        return Some(Err(ContextError::CameraError(Box::new(e))));
      }
      None => {
        info!("摄像头已无更多帧");
        self.post(CameraEvent::Disconnected);
        self.pump();
        return None;
      }
    };

    self.post(CameraEvent::FrameAvailable);
    if !self.pump().contains(&CameraAction::RenderFrame) {
      return None;
    }

    self.frame_index += 1;
    let index = self.frame_index;
    let overlay = match self.process_frame(&frame) {
      Ok(overlay) => overlay,
      Err(e) => return Some(Err(e)),
    };
    Some(Ok(ProcessedFrame {
      index,
      frame,
      overlay,
    }))
  }

  /// 关闭摄像头并释放模型
  pub fn shutdown(mut self) {
    info!("正在关闭...");
    let actions = self.session.close();
    if let Err(e) = self.execute(&actions) {
      warn!("关闭摄像头时出错: {}", e);
    }
    self.model.close();
    info!("资源已释放，共处理 {} 帧", self.frame_index);
  }

  fn post(&self, event: CameraEvent) {
    // 接收端由 self.session 持有，发送不会失败
    let _ = self.events.send(event);
  }

  fn pump(&mut self) -> Vec<CameraAction> {
    match self.pump_inner() {
      Ok(actions) => actions,
      Err((actions, e)) => {
        warn!("摄像头打开失败: {}", e);
        actions
      }
    }
  }

  fn pump_checked(&mut self) -> Result<(), ContextError> {
    self
      .pump_inner()
      .map(|_| ())
      .map_err(|(_, e)| ContextError::CameraError(Box::new(e)))
  }

  // 处理会话给出的动作，动作可能产生新的事件，直到没有新事件为止
  fn pump_inner(&mut self) -> Result<Vec<CameraAction>, (Vec<CameraAction>, P::Error)> {
    let mut all = Vec::new();
    let mut failure = None;
    loop {
      let actions = self.session.drain();
      if actions.is_empty() {
        break;
      }
      if let Err(e) = self.execute(&actions) {
        failure = Some(e);
      }
      all.extend(actions);
    }
    match failure {
      Some(e) => Err((all, e)),
      None => Ok(all),
    }
  }

  fn execute(&mut self, actions: &[CameraAction]) -> Result<(), P::Error> {
    let mut result = Ok(());
    for action in actions {
      match action {
        CameraAction::RequestPermission => warn!("需要摄像头权限"),
        CameraAction::OpenDevice => match self.provider.open() {
          Ok(()) => self.post(CameraEvent::DeviceOpened),
          Err(e) => {
            error!("打开摄像头失败: {}", e);
            self.post(CameraEvent::DeviceError(-1));
            result = Err(e);
          }
        },
        CameraAction::ConfigureSession => self.post(CameraEvent::SessionConfigured),
        CameraAction::StartPreview => info!("开始预览"),
        CameraAction::RenderFrame => {}
        CameraAction::CloseDevice => {
          self.provider.close();
          info!("摄像头已关闭");
        }
      }
    }
    result
  }
}
