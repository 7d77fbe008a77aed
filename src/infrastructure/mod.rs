//! 基础设施层（Infrastructure）
//!
//! 只负责持久化，不关心批次流程：
//! - `ledger_store` - 追踪文件的读取和后台追加写入
//! - `folder_registry` - 已注册文件夹列表

pub mod folder_registry;
pub mod ledger_store;

pub use folder_registry::FolderRegistry;
pub use ledger_store::{LedgerStore, LedgerWriter};
