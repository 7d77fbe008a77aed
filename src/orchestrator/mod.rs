//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责文件夹批次的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 加载文件夹注册表
//! - 监听 Ctrl-C，转成停止请求
//! - 依次处理每个已注册的文件夹
//! - 输出全局统计信息
//!
//! ### `batch_processor` - 文件夹批处理器
//! - 单飞门控（`ProcessController`）
//! - 准备、清理、扫描
//! - 控制并发数量（Semaphore）
//! - 汇总单个批次的结果
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<Folder>)
//!     ↓
//! batch_processor (处理一个文件夹的 Vec<Candidate>)
//!     ↓
//! workflow::FileFlow (处理单个文件：尝试 → 重试 → 记账)
//!     ↓
//! services (能力层：scanner / mutator / ledger / progress)
//!     ↓
//! infrastructure (基础设施：追踪文件、注册表)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管文件夹列表，batch_processor 管单个文件夹
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不关心文件如何被变更

pub mod app;
pub mod batch_processor;

// 重新导出主要类型
pub use app::App;
pub use batch_processor::FolderProcessor;
