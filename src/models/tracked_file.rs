use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 已处理文件的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    /// 变更成功
    Purged,
    /// 失败、停止或重试耗尽
    Skipped,
}

impl TrackStatus {
    /// 该类别在文件夹中对应的追踪文件名
    pub fn file_name(self) -> &'static str {
        match self {
            TrackStatus::Purged => "purged_files.txt",
            TrackStatus::Skipped => "skipped_files.txt",
        }
    }

    pub fn all() -> [TrackStatus; 2] {
        [TrackStatus::Purged, TrackStatus::Skipped]
    }
}

/// 账本中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub status: TrackStatus,
}

impl TrackedFile {
    pub fn new(path: impl Into<PathBuf>, status: TrackStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}
