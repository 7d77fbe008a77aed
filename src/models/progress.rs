use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 进度消息的严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    /// 消息前缀图标
    pub fn icon(self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
            Severity::Success => "✅",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        };
        f.write_str(name)
    }
}

/// 进度日志中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub text: String,
    pub severity: Severity,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for ProgressMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.icon(), self.text)
    }
}

/// 批次进度快照
///
/// 由 `ProgressAggregator` 独占维护，对外只暴露不可变副本。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total_files: usize,
    pub processed_files: usize,
    /// 始终位于 `[0, 1]`
    pub progress_fraction: f64,
    /// 进度条旁的说明文字
    pub status_text: String,
    /// 按时间顺序排列，超出容量时丢弃最旧的
    pub messages: Vec<ProgressMessage>,
    /// 因容量限制被丢弃的消息数
    pub dropped_messages: usize,
}

impl BatchProgress {
    /// 指定严重程度的消息
    pub fn messages_with(&self, severity: Severity) -> impl Iterator<Item = &ProgressMessage> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    pub fn last_message(&self) -> Option<&ProgressMessage> {
        self.messages.last()
    }

    pub fn is_complete(&self) -> bool {
        self.total_files > 0 && self.processed_files >= self.total_files
    }
}

/// 推送给观察者的离散事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// 新批次开始
    BatchStarted { total: usize },
    /// 一条新消息
    Message(ProgressMessage),
    /// 已处理数变化
    Progress { processed: usize, total: usize },
}
