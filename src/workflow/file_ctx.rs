//! 文件处理上下文
//!
//! 封装"我正在处理批次中的哪个文件"这一信息

use crate::utils::display_name;
use std::fmt::Display;
use std::path::PathBuf;

/// 文件处理上下文
#[derive(Debug, Clone)]
pub struct FileCtx {
    /// 文件完整路径
    pub path: PathBuf,

    /// 文件名（用于消息显示）
    pub file_name: String,

    /// 在本批次中的序号（从1开始，仅用于日志）
    pub index: usize,

    /// 本批次候选总数
    pub total: usize,
}

impl FileCtx {
    pub fn new(path: PathBuf, index: usize, total: usize) -> Self {
        let file_name = display_name(&path);
        Self {
            path,
            file_name,
            index,
            total,
        }
    }
}

impl Display for FileCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文件 {}/{} {}]", self.index, self.total, self.file_name)
    }
}
