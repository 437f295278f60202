// 该文件是 Kanjian （看见） 项目的一部分。
// src/camera.rs - 摄像头会话状态机
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

//! 摄像头生命周期 `Closed → Opening → Streaming → Closed`。
//!
//! 权限、画面表面和设备回调都以 [`CameraEvent`] 的形式经由通道送入
//! [`CameraSession`]，会话根据当前状态给出需要执行的 [`CameraAction`]。

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
  Closed,
  Opening,
  Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  Unknown,
  Granted,
  Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
  PermissionGranted,
  PermissionDenied,
  SurfaceAvailable { width: u32, height: u32 },
  SurfaceResized { width: u32, height: u32 },
  SurfaceDestroyed,
  DeviceOpened,
  SessionConfigured,
  ConfigureFailed,
  Disconnected,
  DeviceError(i32),
  FrameAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
  RequestPermission,
  OpenDevice,
  ConfigureSession,
  StartPreview,
  RenderFrame,
  CloseDevice,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
  #[error("状态 {state:?} 下不应出现事件 {event:?}")]
  UnexpectedEvent {
    state: CameraState,
    event: CameraEvent,
  },
}

#[derive(Debug)]
pub struct CameraSession {
  state: CameraState,
  permission: Permission,
  pending_open: bool,
  device_open: bool,
  surface: Option<(u32, u32)>,
  events: Receiver<CameraEvent>,
}

impl CameraSession {
  /// 新建会话，返回用于投递事件的发送端
  pub fn new() -> (Self, Sender<CameraEvent>) {
    let (tx, rx) = mpsc::channel();
    let session = Self {
      state: CameraState::Closed,
      permission: Permission::Unknown,
      pending_open: false,
      device_open: false,
      surface: None,
      events: rx,
    };
    (session, tx)
  }

  pub fn state(&self) -> CameraState {
    self.state
  }

  pub fn permission(&self) -> Permission {
    self.permission
  }

  pub fn surface_size(&self) -> Option<(u32, u32)> {
    self.surface
  }

  pub fn is_streaming(&self) -> bool {
    self.state == CameraState::Streaming
  }

  /// 处理单个事件。非法事件不改变状态。
  pub fn handle(&mut self, event: CameraEvent) -> Result<Vec<CameraAction>, CameraError> {
    use CameraAction::*;
    use CameraEvent::*;
    use CameraState::*;

    let actions = match (self.state, event) {
      (_, PermissionGranted) => {
        self.permission = Permission::Granted;
        if self.pending_open && self.state == Closed {
          self.pending_open = false;
          self.state = Opening;
          vec![OpenDevice]
        } else {
          vec![]
        }
      }
      // 权限被收回时关闭设备，表面仍在则等待重新授权后再打开
      (_, PermissionDenied) => {
        self.permission = Permission::Denied;
        self.pending_open = self.surface.is_some();
        let mut actions = self.teardown();
        actions.push(RequestPermission);
        actions
      }
      (Closed, SurfaceAvailable { width, height }) => {
        self.surface = Some((width, height));
        if self.permission == Permission::Granted {
          self.state = Opening;
          vec![OpenDevice]
        } else {
          self.pending_open = true;
          vec![RequestPermission]
        }
      }
      (_, SurfaceResized { width, height }) if self.surface.is_some() => {
        self.surface = Some((width, height));
        vec![]
      }
      (Opening, DeviceOpened) if !self.device_open => {
        self.device_open = true;
        vec![ConfigureSession]
      }
      // 表面已销毁后才打开的设备直接关闭
      (Closed, DeviceOpened) => vec![CloseDevice],
      (Opening, SessionConfigured) if self.device_open => {
        self.state = Streaming;
        vec![StartPreview]
      }
      (Streaming, FrameAvailable) => vec![RenderFrame],
      (Closed | Opening, FrameAvailable) => {
        debug!("状态 {:?} 下忽略新帧", self.state);
        vec![]
      }
      (Opening | Streaming, ConfigureFailed | Disconnected | DeviceError(_)) => self.teardown(),
      (_, SurfaceDestroyed) => {
        self.surface = None;
        self.pending_open = false;
        self.teardown()
      }
      (state, event) => {
        warn!("状态 {:?} 下不应出现事件 {:?}", state, event);
        return Err(CameraError::UnexpectedEvent { state, event });
      }
    };

    debug!("事件 {:?} -> 状态 {:?}, 动作 {:?}", event, self.state, actions);
    Ok(actions)
  }

  /// 处理通道中已排队的全部事件，非法事件被丢弃
  pub fn drain(&mut self) -> Vec<CameraAction> {
    let mut actions = Vec::new();
    loop {
      match self.events.try_recv() {
        Ok(event) => {
          if let Ok(more) = self.handle(event) {
            actions.extend(more);
          }
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
    }
    actions
  }

  /// 主动关闭会话
  pub fn close(&mut self) -> Vec<CameraAction> {
    self.pending_open = false;
    let actions = self.teardown();
    info!("摄像头会话已关闭");
    actions
  }

  fn teardown(&mut self) -> Vec<CameraAction> {
    self.state = CameraState::Closed;
    if std::mem::take(&mut self.device_open) {
      vec![CameraAction::CloseDevice]
    } else {
      vec![]
    }
  }
}
