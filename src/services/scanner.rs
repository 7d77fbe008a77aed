//! 候选文件扫描 - 业务能力层
//!
//! 负责文件夹的准备、校验、清理和扫描，产出一个批次的工作列表。
//! 所有文件系统遍历都在阻塞线程池中执行，不占用调度线程。

use crate::error::{PurgeError, Result, SetupError};
use crate::models::{FolderStats, TrackStatus};
use crate::services::ledger::Ledger;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// 待删除文件的子目录
pub const TO_DELETE_DIR: &str = "to_delete";
/// 日志子目录
pub const LOGS_DIR: &str = "logs";
/// 中断运行留下的临时文件扩展名
pub const TEMP_EXTENSION: &str = "temp";
/// 写权限探测文件
pub const WRITE_PROBE_FILE: &str = ".test_write_permission";

/// 一次扫描的结果
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// 尚未处理过的候选文件
    pub candidates: Vec<PathBuf>,
    /// 匹配命名规则的文件总数（包括已处理的）
    pub found: usize,
    pub previously_purged: usize,
    pub previously_skipped: usize,
    /// 遍历过程中遇到的错误，扫描会跳过出错的条目继续
    pub errors: Vec<String>,
}

impl ScanSummary {
    /// 给进度日志使用的摘要
    pub fn messages(&self, label: &str) -> Vec<String> {
        vec![
            format!("Found {} new {} files to process", self.candidates.len(), label),
            format!(
                "({} previously processed, {} skipped)",
                self.previously_purged, self.previously_skipped
            ),
        ]
    }
}

/// 候选文件扫描器
///
/// 职责：
/// - 准备文件夹结构和追踪文件
/// - 清理上次中断留下的临时文件
/// - 按命名规则遍历文件夹，排除账本中已有的路径
/// - 不关心文件内容
#[derive(Debug, Clone)]
pub struct CandidateScanner {
    pattern: Regex,
}

impl CandidateScanner {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// 使用正则字符串创建
    pub fn with_pattern(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self::new(Regex::new(pattern)?))
    }

    /// 文件名是否匹配命名规则
    pub fn is_candidate_name(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.pattern.is_match(name))
    }

    /// 准备文件夹结构（幂等）
    pub async fn prepare(&self, folder: &Path) -> Result<()> {
        let folder = folder.to_path_buf();
        run_blocking(move || prepare_blocking(&folder)).await??;
        Ok(())
    }

    /// 清理上次中断留下的临时文件，返回删除的数量
    ///
    /// 单个文件删除失败只记录日志，不影响其余文件。
    pub async fn cleanup_stale_artifacts(&self, folder: &Path) -> usize {
        let folder = folder.to_path_buf();
        match run_blocking(move || cleanup_blocking(&folder)).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("❌ 清理临时文件失败: {}", e);
                0
            }
        }
    }

    /// 扫描候选文件
    pub async fn scan(&self, folder: &Path, ledger: &Ledger) -> Result<ScanSummary> {
        let root = folder.to_path_buf();
        let pattern = self.pattern.clone();
        let (matched, errors) = run_blocking(move || walk_matching(&root, &pattern)).await?;

        let mut summary = ScanSummary {
            found: matched.len(),
            previously_purged: ledger.purged_count(),
            previously_skipped: ledger.skipped_count(),
            errors,
            ..Default::default()
        };
        summary.candidates = matched
            .into_iter()
            .filter(|path| !ledger.is_resolved(path))
            .collect();

        for e in &summary.errors {
            warn!("⚠️ 扫描时跳过条目: {}", e);
        }
        info!(
            "🔍 扫描完成: {} 个匹配文件，{} 个待处理",
            summary.found,
            summary.candidates.len()
        );
        Ok(summary)
    }

    /// 校验文件夹：存在、是目录、可写
    pub async fn validate(&self, folder: &Path) -> Result<()> {
        let folder = folder.to_path_buf();
        run_blocking(move || validate_blocking(&folder)).await??;
        Ok(())
    }

    /// 文件夹统计（匹配总数 / 已处理 / 已跳过 / 待处理）
    pub async fn folder_stats(&self, folder: &Path, ledger: &Ledger) -> Result<FolderStats> {
        let root = folder.to_path_buf();
        let pattern = self.pattern.clone();
        let (matched, _) = run_blocking(move || walk_matching(&root, &pattern)).await?;

        let mut stats = FolderStats {
            total_files: matched.len(),
            purged_files: ledger.purged_count(),
            skipped_files: ledger.skipped_count(),
            pending_files: 0,
        };
        stats.pending_files = matched
            .iter()
            .filter(|path| !ledger.is_resolved(path))
            .count();
        Ok(stats)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PurgeError::scan(PathBuf::new(), format!("后台任务失败: {}", e)))
}

fn prepare_blocking(folder: &Path) -> std::result::Result<(), SetupError> {
    let create = |path: &Path| {
        std::fs::create_dir_all(path).map_err(|source| SetupError::CreateFailed {
            path: path.to_path_buf(),
            source,
        })
    };

    create(folder)?;
    create(&folder.join(TO_DELETE_DIR))?;
    create(&folder.join(LOGS_DIR))?;

    for status in TrackStatus::all() {
        let track_path = folder.join(status.file_name());
        if !track_path.exists() {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&track_path)
                .map_err(|source| SetupError::CreateFailed {
                    path: track_path.clone(),
                    source,
                })?;
        }
    }

    validate_blocking(folder)?;
    debug!("文件夹结构已准备: {}", folder.display());
    Ok(())
}

fn validate_blocking(folder: &Path) -> std::result::Result<(), SetupError> {
    if !folder.exists() {
        return Err(SetupError::NotFound {
            path: folder.to_path_buf(),
        });
    }
    if !folder.is_dir() {
        return Err(SetupError::NotADirectory {
            path: folder.to_path_buf(),
        });
    }

    let probe = folder.join(WRITE_PROBE_FILE);
    let to_err = |source| SetupError::NotWritable {
        path: folder.to_path_buf(),
        source,
    };
    std::fs::write(&probe, b"").map_err(to_err)?;
    std::fs::remove_file(&probe).map_err(to_err)?;
    Ok(())
}

fn cleanup_blocking(folder: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(folder).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_temp = entry.file_type().is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION);
        if !is_temp {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("🗑️ 已删除临时文件: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("⚠️ 无法删除临时文件 {}: {}", path.display(), e),
        }
    }
    if removed > 0 {
        info!("🗑️ 已清理 {} 个临时文件", removed);
    }
    removed
}

fn walk_matching(root: &Path, pattern: &Regex) -> (Vec<PathBuf>, Vec<String>) {
    let mut matched = Vec::new();
    let mut errors = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                let is_match = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| pattern.is_match(name));
                if is_match {
                    matched.push(entry.into_path());
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    matched.sort();
    (matched, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner() -> CandidateScanner {
        CandidateScanner::with_pattern(r"(?i)^bilag_.*\.pdf$").unwrap()
    }

    #[test]
    fn test_candidate_name_predicate() {
        let scanner = scanner();
        assert!(scanner.is_candidate_name(Path::new("/a/bilag_1.pdf")));
        assert!(scanner.is_candidate_name(Path::new("/a/BILAG_2.PDF")));
        assert!(!scanner.is_candidate_name(Path::new("/a/report.pdf")));
        assert!(!scanner.is_candidate_name(Path::new("/a/bilag_3.pdf.temp")));
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("new_folder");

        scanner().prepare(&folder).await.unwrap();
        scanner().prepare(&folder).await.unwrap();

        assert!(folder.join(TO_DELETE_DIR).is_dir());
        assert!(folder.join(LOGS_DIR).is_dir());
        assert!(folder.join("purged_files.txt").is_file());
        assert!(folder.join("skipped_files.txt").is_file());
        assert!(!folder.join(WRITE_PROBE_FILE).exists());
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        assert!(matches!(
            scanner().validate(&missing).await,
            Err(PurgeError::Setup(SetupError::NotFound { .. }))
        ));
        assert!(matches!(
            scanner().validate(&file).await,
            Err(PurgeError::Setup(SetupError::NotADirectory { .. }))
        ));
        assert!(scanner().validate(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("bilag_1.pdf1234.temp"), "").unwrap();
        fs::write(nested.join("x.temp"), "").unwrap();
        fs::write(nested.join("bilag_2.pdf"), "").unwrap();

        let removed = scanner().cleanup_stale_artifacts(dir.path()).await;

        assert_eq!(removed, 2);
        assert!(nested.join("bilag_2.pdf").exists());
    }

    #[tokio::test]
    async fn test_scan_excludes_ledgered_paths() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2024").join("q1");
        fs::create_dir_all(&nested).unwrap();
        for name in ["bilag_1.pdf", "bilag_2.pdf", "other.pdf"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::write(nested.join("Bilag_3.PDF"), "").unwrap();

        let ledger = Ledger::load(dir.path(), 8).await.unwrap();
        ledger.mark_purged(&dir.path().join("bilag_1.pdf")).await;

        let summary = scanner().scan(dir.path(), &ledger).await.unwrap();
        assert_eq!(summary.found, 3);
        assert_eq!(summary.previously_purged, 1);
        assert_eq!(summary.previously_skipped, 0);
        assert_eq!(
            summary.candidates,
            vec![dir.path().join("2024/q1/Bilag_3.PDF"), dir.path().join("bilag_2.pdf")]
        );
        assert_eq!(
            summary.messages("PDF"),
            vec![
                "Found 2 new PDF files to process".to_string(),
                "(1 previously processed, 0 skipped)".to_string()
            ]
        );

        let stats = scanner().folder_stats(dir.path(), &ledger).await.unwrap();
        assert_eq!(
            stats,
            FolderStats {
                total_files: 3,
                purged_files: 1,
                skipped_files: 0,
                pending_files: 2,
            }
        );
        ledger.close().await;
    }

    #[tokio::test]
    async fn test_scan_missing_folder_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path(), 8).await.unwrap();

        let summary = scanner()
            .scan(&dir.path().join("gone"), &ledger)
            .await
            .unwrap();
        assert!(summary.candidates.is_empty());
        assert_eq!(summary.errors.len(), 1);
        ledger.close().await;
    }
}
