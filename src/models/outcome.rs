use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 被停止时使用的标准消息
pub const STOPPED_BY_USER: &str = "Processing stopped by user";

/// 文档变更服务单次调用的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub success: bool,
    pub message: String,
    /// 由停止信号导致的未完成
    #[serde(default)]
    pub stopped: bool,
}

impl MutationOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            stopped: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stopped: false,
        }
    }

    pub fn stopped() -> Self {
        Self {
            success: false,
            message: STOPPED_BY_USER.to_string(),
            stopped: true,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// 批次的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// 控制器已有批次在运行，本次调用未做任何事
    AlreadyRunning,
    /// 没有新的候选文件
    NothingToProcess,
    /// 所有候选文件均已尝试
    Completed,
    /// 被用户停止
    Stopped,
}

/// `run_batch` 的返回值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub folder: PathBuf,
    pub status: BatchStatus,
    /// 候选文件总数
    pub total: usize,
    /// 已得出结果的候选数（包括跳过和停止）
    pub attempted: usize,
    /// 变更成功的候选数
    pub succeeded: usize,
    /// 因停止而未完成的候选数
    pub stopped: usize,
}

impl BatchReport {
    pub fn empty(folder: impl Into<PathBuf>, status: BatchStatus) -> Self {
        Self {
            folder: folder.into(),
            status,
            total: 0,
            attempted: 0,
            succeeded: 0,
            stopped: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] 成功 {}/{}，已尝试 {}",
            self.folder.display(),
            self.status,
            self.succeeded,
            self.total,
            self.attempted
        )
    }
}

/// 文件夹统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub total_files: usize,
    pub purged_files: usize,
    pub skipped_files: usize,
    pub pending_files: usize,
}
