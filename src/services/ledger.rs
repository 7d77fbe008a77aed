//! 追踪账本 - 业务能力层
//!
//! 记录某个文件夹中哪些文件已经处理过（purged / skipped），
//! 保证同一个文件不会在后续批次中被重复处理。

use crate::error::LedgerError;
use crate::infrastructure::{LedgerStore, LedgerWriter};
use crate::models::{TrackStatus, TrackedFile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Sets {
    purged: HashSet<PathBuf>,
    skipped: HashSet<PathBuf>,
}

/// 追踪账本
///
/// 职责：
/// - 批次开始时从磁盘加载一次
/// - 内存集合同步更新，同一进程内立即可见
/// - 每次标记追加一行到磁盘（后台写入）
/// - 一个路径最多属于一个类别
#[derive(Debug)]
pub struct Ledger {
    store: LedgerStore,
    sets: Mutex<Sets>,
    writer: LedgerWriter,
}

impl Ledger {
    /// 加载文件夹的账本并启动后台写入任务
    pub async fn load(folder: impl AsRef<Path>, queue_capacity: usize) -> Result<Self, LedgerError> {
        let store = LedgerStore::new(folder.as_ref());
        let purged = store.load(TrackStatus::Purged).await?;
        let mut skipped = store.load(TrackStatus::Skipped).await?;

        let overlap: Vec<PathBuf> = skipped.intersection(&purged).cloned().collect();
        if !overlap.is_empty() {
            warn!(
                "⚠️ {} 个路径同时出现在两个追踪文件中，按 purged 处理",
                overlap.len()
            );
            for path in &overlap {
                skipped.remove(path);
            }
        }

        info!(
            "📒 账本已加载: {} (purged {}, skipped {})",
            store.folder().display(),
            purged.len(),
            skipped.len()
        );

        let writer = store.spawn_writer(queue_capacity);
        Ok(Self {
            store,
            sets: Mutex::new(Sets { purged, skipped }),
            writer,
        })
    }

    fn sets(&self) -> MutexGuard<'_, Sets> {
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn folder(&self) -> &Path {
        self.store.folder()
    }

    /// 路径是否已处理过（任一类别）
    pub fn is_resolved(&self, path: &Path) -> bool {
        self.status_of(path).is_some()
    }

    pub fn status_of(&self, path: &Path) -> Option<TrackStatus> {
        let sets = self.sets();
        if sets.purged.contains(path) {
            Some(TrackStatus::Purged)
        } else if sets.skipped.contains(path) {
            Some(TrackStatus::Skipped)
        } else {
            None
        }
    }

    pub fn purged_count(&self) -> usize {
        self.sets().purged.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.sets().skipped.len()
    }

    /// 标记为变更成功，返回是否新增了记录
    pub async fn mark_purged(&self, path: &Path) -> bool {
        self.mark(path, TrackStatus::Purged).await
    }

    /// 标记为跳过，返回是否新增了记录
    pub async fn mark_skipped(&self, path: &Path) -> bool {
        self.mark(path, TrackStatus::Skipped).await
    }

    async fn mark(&self, path: &Path, status: TrackStatus) -> bool {
        {
            let mut sets = self.sets();
            if sets.purged.contains(path) || sets.skipped.contains(path) {
                return false;
            }
            let set = match status {
                TrackStatus::Purged => &mut sets.purged,
                TrackStatus::Skipped => &mut sets.skipped,
            };
            set.insert(path.to_path_buf());
        }

        self.writer.append(TrackedFile::new(path, status)).await;
        true
    }

    /// 关闭写入队列，返回后所有标记都已写入磁盘
    pub async fn close(&self) {
        self.writer.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_is_idempotent_and_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path(), 8).await.unwrap();
        let file = dir.path().join("bilag_1.pdf");

        assert!(!ledger.is_resolved(&file));
        assert!(ledger.mark_purged(&file).await);
        assert!(!ledger.mark_purged(&file).await);
        assert!(!ledger.mark_skipped(&file).await);

        assert_eq!(ledger.status_of(&file), Some(TrackStatus::Purged));
        assert_eq!(ledger.purged_count(), 1);
        assert_eq!(ledger.skipped_count(), 0);
        ledger.close().await;
    }

    #[tokio::test]
    async fn test_marks_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("bilag_a.pdf");
        let b = dir.path().join("bilag_b.pdf");

        let ledger = Ledger::load(dir.path(), 8).await.unwrap();
        ledger.mark_purged(&a).await;
        ledger.mark_skipped(&b).await;
        ledger.close().await;

        let reloaded = Ledger::load(dir.path(), 8).await.unwrap();
        assert_eq!(reloaded.status_of(&a), Some(TrackStatus::Purged));
        assert_eq!(reloaded.status_of(&b), Some(TrackStatus::Skipped));
        reloaded.close().await;
    }

    #[tokio::test]
    async fn test_overlapping_store_resolves_to_purged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("purged_files.txt"), "/p/bilag_x.pdf\n").unwrap();
        std::fs::write(
            dir.path().join("skipped_files.txt"),
            "/p/bilag_x.pdf\n/p/bilag_y.pdf\n",
        )
        .unwrap();

        let ledger = Ledger::load(dir.path(), 8).await.unwrap();
        assert_eq!(
            ledger.status_of(Path::new("/p/bilag_x.pdf")),
            Some(TrackStatus::Purged)
        );
        assert_eq!(ledger.skipped_count(), 1);
        ledger.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_marks_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = std::sync::Arc::new(Ledger::load(dir.path(), 4).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..64 {
            let ledger = ledger.clone();
            let path = dir.path().join(format!("bilag_{}.pdf", i % 32));
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.mark_purged(&path).await
                } else {
                    ledger.mark_skipped(&path).await
                }
            }));
        }
        let newly_marked = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(newly_marked, 32);
        assert_eq!(ledger.purged_count() + ledger.skipped_count(), 32);
        ledger.close().await;

        let reloaded = Ledger::load(dir.path(), 4).await.unwrap();
        assert_eq!(reloaded.purged_count() + reloaded.skipped_count(), 32);
        reloaded.close().await;
    }
}
