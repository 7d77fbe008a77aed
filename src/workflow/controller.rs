//! 处理控制器 - 流程层
//!
//! 状态机：
//!
//! ```text
//! Idle --start--> Running --request_stop--> StopRequested --reset--> Idle
//! Running --reset--> Idle
//! ```
//!
//! 控制器是显式传递的句柄（克隆共享同一状态），不是进程级全局变量。
//! 同一个控制器同时只允许一个批次运行；需要多个文件夹并行时，各自使用独立的控制器。

use crate::services::StopSignal;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Running,
    StopRequested,
}

#[derive(Debug)]
struct Inner {
    state: ProcessingState,
    active_folders: BTreeSet<PathBuf>,
    token: CancellationToken,
}

/// 处理控制器
#[derive(Debug, Clone)]
pub struct ProcessController {
    inner: Arc<Mutex<Inner>>,
}

impl ProcessController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessingState::Idle,
                active_folders: BTreeSet::new(),
                token: CancellationToken::new(),
            })),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Idle → Running`，登记文件夹并清除停止标记
    ///
    /// 已有批次（运行中或等待复位）时返回 false，状态不变。
    pub fn start(&self, folder: &Path) -> bool {
        let mut inner = self.inner();
        if inner.state != ProcessingState::Idle {
            warn!(
                "⚠️ 已有批次在运行，拒绝启动: {}",
                folder.display()
            );
            return false;
        }
        inner.state = ProcessingState::Running;
        inner.token = CancellationToken::new();
        inner.active_folders.insert(folder.to_path_buf());
        info!("▶️ 开始处理: {}", folder.display());
        true
    }

    /// `Running → StopRequested`，立即让 `is_active()` 变为 false 并取消所有任务的信号
    pub fn request_stop(&self) -> bool {
        let mut inner = self.inner();
        if inner.state != ProcessingState::Running {
            return false;
        }
        inner.state = ProcessingState::StopRequested;
        inner.token.cancel();
        info!("⏹️ 已请求停止，进行中的任务将在下一个检查点退出");
        true
    }

    /// 无条件回到 `Idle`
    pub fn reset(&self) {
        let mut inner = self.inner();
        inner.state = ProcessingState::Idle;
        inner.active_folders.clear();
        // 旧批次的信号保持原状，新 token 留给下一次 start
        inner.token = CancellationToken::new();
    }

    pub fn state(&self) -> ProcessingState {
        self.inner().state
    }

    pub fn is_active(&self) -> bool {
        self.inner().state == ProcessingState::Running
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner().state == ProcessingState::StopRequested
    }

    /// 当前批次的停止信号，分发给每个任务
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal::new(self.inner().token.clone())
    }

    pub fn active_folders(&self) -> Vec<PathBuf> {
        self.inner().active_folders.iter().cloned().collect()
    }
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new()
    }
}
