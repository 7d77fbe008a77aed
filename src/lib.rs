//! # PDF Purger
//!
//! 按文件夹批量处理 PDF 的 Rust 应用程序：扫描候选文件、有限并发地调用外部变更命令、
//! 失败重试、把结果记入文件夹内的追踪文件，并持续发布进度。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只负责持久化
//! - `LedgerStore` - `purged_files.txt` / `skipped_files.txt` 的读取和后台追加
//! - `FolderRegistry` - 已注册文件夹列表（JSON）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文件或单个文件夹
//! - `CandidateScanner` - 准备文件夹、清理残留、扫描候选
//! - `Ledger` - 已处理 / 已跳过集合，保证每个路径只记一次
//! - `DocumentMutator` / `CommandMutator` - 变更单个文件的能力
//! - `ProgressAggregator` - 进度计数和消息日志
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的完整处理流程
//! - `ProcessController` - 单飞门控和停止信号
//! - `FileCtx` - 上下文封装（路径 + 序号）
//! - `FileFlow` - 流程编排（尝试 → 重试 → 记账 → 进度）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 文件夹批处理器，管理并发
//! - `orchestrator/app` - 应用入口，遍历注册的文件夹
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{PurgeError, Result};
pub use infrastructure::{FolderRegistry, LedgerStore};
pub use models::{BatchProgress, BatchReport, BatchStatus, MutationOutcome, Severity};
pub use orchestrator::{App, FolderProcessor};
pub use services::{
    CandidateScanner, CommandMutator, DocumentMutator, Ledger, ProgressAggregator, StopSignal,
};
pub use workflow::{FileCtx, FileFlow, FileResult, ProcessController, RetryPolicy};
