//! 账本持久化 - 基础设施层
//!
//! 每个文件夹下有两个追踪文件（`purged_files.txt` / `skipped_files.txt`），
//! 每行一个路径，只追加不重写。
//!
//! 写入通过有界队列交给唯一的后台写入任务：
//! - 调用方只负责入队，队列满时等待（背压）
//! - 写入失败只记录日志，不影响批次
//! - `close()` 之后所有已入队的记录都已落盘

use crate::error::LedgerError;
use crate::models::{TrackStatus, TrackedFile};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 某个文件夹的追踪文件位置
#[derive(Debug, Clone)]
pub struct LedgerStore {
    folder: PathBuf,
}

impl LedgerStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// 某个类别对应的追踪文件路径
    pub fn path_for(&self, status: TrackStatus) -> PathBuf {
        self.folder.join(status.file_name())
    }

    /// 读取某个类别的全部路径
    ///
    /// 文件不存在视为空集合；读取失败（包括非 UTF-8 内容）直接报错，
    /// 不会静默丢弃已有记录。
    pub async fn load(&self, status: TrackStatus) -> Result<HashSet<PathBuf>, LedgerError> {
        let path = self.path_for(status);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(source) => return Err(LedgerError::ReadFailed { path, source }),
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// 启动后台写入任务
    pub fn spawn_writer(&self, capacity: usize) -> LedgerWriter {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(write_loop(self.clone(), rx));
        LedgerWriter {
            tx: Mutex::new(Some(tx)),
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// 追加一行，失败时返回错误（由写入任务记录）
    async fn append(
        &self,
        files: &mut HashMap<TrackStatus, File>,
        entry: &TrackedFile,
    ) -> Result<(), LedgerError> {
        let path = self.path_for(entry.status);
        let to_err = |source| LedgerError::AppendFailed {
            path: path.clone(),
            source,
        };

        if !files.contains_key(&entry.status) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(to_err)?;
            files.insert(entry.status, file);
        }

        let line = format!("{}\n", entry.path.to_string_lossy());
        let result = match files.get_mut(&entry.status) {
            Some(file) => match file.write_all(line.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            None => Ok(()),
        };

        if let Err(source) = result {
            // 句柄可能已失效，下次重新打开
            files.remove(&entry.status);
            return Err(to_err(source));
        }
        Ok(())
    }
}

async fn write_loop(store: LedgerStore, mut rx: mpsc::Receiver<TrackedFile>) {
    let mut files = HashMap::new();
    while let Some(entry) = rx.recv().await {
        match store.append(&mut files, &entry).await {
            Ok(()) => debug!(
                "📝 已记录 {:?}: {}",
                entry.status,
                entry.path.display()
            ),
            Err(e) => warn!("⚠️ {}", e),
        }
    }
}

/// 后台写入任务的句柄
#[derive(Debug)]
pub struct LedgerWriter {
    tx: Mutex<Option<mpsc::Sender<TrackedFile>>>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LedgerWriter {
    /// 入队一条记录；队列已关闭时记录警告
    pub async fn append(&self, entry: TrackedFile) {
        let tx = match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let Some(tx) = tx else {
            warn!(
                "⚠️ 账本写入队列已关闭，未持久化: {}",
                entry.path.display()
            );
            return;
        };
        if let Err(e) = tx.send(entry).await {
            warn!(
                "⚠️ 账本写入任务已退出，未持久化: {}",
                e.0.path.display()
            );
        }
    }

    /// 关闭队列并等待所有记录落盘
    pub async fn close(&self) {
        match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("⚠️ 账本写入任务异常结束: {}", e);
            }
        }
    }
}
