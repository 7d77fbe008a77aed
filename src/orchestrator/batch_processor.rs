//! 文件夹批处理器 - 编排层
//!
//! ## 职责
//!
//! 把一个文件夹变成一个受控的批次：准备、清理、扫描，然后以有限并发
//! 对每个候选文件执行带重试的变更，全程发布进度并响应停止请求。
//!
//! ## 核心流程
//!
//! 1. **启动门控**：`ProcessController::start`，已有批次时直接返回
//! 2. **准备**：创建子目录和追踪文件，失败则整个批次失败
//! 3. **清理**：删除上次中断留下的临时文件
//! 4. **扫描**：排除账本中已有的路径，发布扫描摘要
//! 5. **并发执行**：每个候选一个任务，Semaphore 限制同时进行的变更数量
//! 6. **收尾**：账本落盘、控制器复位、发布最终结果
//!
//! ## 设计特点
//!
//! - **单飞**：同一个控制器同时只有一个批次
//! - **协作式停止**：每个任务在获取许可、每次尝试前、重试等待中检查停止信号
//! - **错误隔离**：单个文件的失败不会影响其他文件
//! - **向下委托**：单个文件的处理交给 `workflow::FileFlow`

use crate::config::{Config, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::error::{ConfigError, PurgeError, Result};
use crate::models::{BatchReport, BatchStatus, FolderStats, Severity, STOPPED_BY_USER};
use crate::services::{
    CandidateScanner, DocumentMutator, Ledger, ProgressAggregator, ScanSummary, StopSignal,
};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{FileCtx, FileFlow, FileResult, ProcessController, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// 无论批次如何结束都让控制器复位
struct ResetOnDrop<'a>(&'a ProcessController);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// 文件夹批处理器
pub struct FolderProcessor {
    controller: ProcessController,
    scanner: CandidateScanner,
    mutator: Arc<dyn DocumentMutator>,
    progress: Arc<ProgressAggregator>,
    policy: RetryPolicy,
    file_label: String,
    ledger_queue_capacity: usize,
}

impl FolderProcessor {
    pub fn new(
        controller: ProcessController,
        scanner: CandidateScanner,
        mutator: Arc<dyn DocumentMutator>,
        progress: Arc<ProgressAggregator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            controller,
            scanner,
            mutator,
            progress,
            policy,
            file_label: "PDF".to_string(),
            ledger_queue_capacity: 256,
        }
    }

    /// 按配置创建
    pub fn from_config(
        config: &Config,
        controller: ProcessController,
        mutator: Arc<dyn DocumentMutator>,
    ) -> std::result::Result<Self, ConfigError> {
        let scanner = CandidateScanner::with_pattern(&config.candidate_pattern)?;
        let progress = Arc::new(ProgressAggregator::new(config.message_log_capacity));
        Ok(Self::new(
            controller,
            scanner,
            mutator,
            progress,
            RetryPolicy::from_config(config),
        )
        .with_file_label(config.file_label.clone())
        .with_ledger_queue_capacity(config.ledger_queue_capacity))
    }

    pub fn with_file_label(mut self, label: impl Into<String>) -> Self {
        self.file_label = label.into();
        self
    }

    pub fn with_ledger_queue_capacity(mut self, capacity: usize) -> Self {
        self.ledger_queue_capacity = capacity.max(1);
        self
    }

    pub fn controller(&self) -> &ProcessController {
        &self.controller
    }

    pub fn progress(&self) -> &Arc<ProgressAggregator> {
        &self.progress
    }

    pub fn scanner(&self) -> &CandidateScanner {
        &self.scanner
    }

    /// 文件夹统计（只读取账本，不启动批次）
    pub async fn folder_stats(&self, folder: &Path) -> Result<FolderStats> {
        let ledger = Ledger::load(folder, self.ledger_queue_capacity).await?;
        let stats = self.scanner.folder_stats(folder, &ledger).await;
        ledger.close().await;
        stats
    }

    /// 处理一个文件夹
    ///
    /// 准备阶段的错误会让整个批次失败并返回 `Err`；
    /// 已有批次在运行时返回 `BatchStatus::AlreadyRunning`，不算错误。
    pub async fn run_batch(&self, folder: &Path, concurrency: usize) -> Result<BatchReport> {
        if !self.controller.start(folder) {
            // 进度日志属于正在运行的批次，这里只写 tracing
            warn!("⚠️ Processing is already in progress, ignoring {}", folder.display());
            return Ok(BatchReport::empty(folder, BatchStatus::AlreadyRunning));
        }
        let reset = ResetOnDrop(&self.controller);
        let stop = self.controller.stop_signal();
        let concurrency = clamp_concurrency(concurrency);
        log_batch_start(folder, concurrency);

        if let Err(e) = self.scanner.prepare(folder).await {
            self.record_error(&e);
            return Err(e);
        }

        self.scanner.cleanup_stale_artifacts(folder).await;

        let ledger = match Ledger::load(folder, self.ledger_queue_capacity).await {
            Ok(ledger) => Arc::new(ledger),
            Err(e) => {
                let e = PurgeError::from(e);
                self.record_error(&e);
                return Err(e);
            }
        };

        let summary = self.scan(folder, &ledger).await;
        let total = summary.candidates.len();
        if total == 0 {
            self.progress.record_message(
                format!("No new {} files found to process.", self.file_label),
                Severity::Warning,
            );
            ledger.close().await;
            return Ok(BatchReport::empty(folder, BatchStatus::NothingToProcess));
        }

        self.progress.start_batch(total);

        let flow = Arc::new(FileFlow::new(
            self.mutator.clone(),
            ledger.clone(),
            self.progress.clone(),
            self.policy,
        ));
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut contexts = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);
        for (idx, path) in summary.candidates.into_iter().enumerate() {
            let ctx = FileCtx::new(path, idx + 1, total);
            handles.push(tokio::spawn(process_candidate(
                flow.clone(),
                semaphore.clone(),
                stop.clone(),
                ctx.clone(),
            )));
            contexts.push(ctx);
        }

        // 等待所有任务完成
        let mut report = BatchReport::empty(folder, BatchStatus::Completed);
        report.total = total;
        let results = futures::future::join_all(handles).await;
        for (ctx, joined) in contexts.iter().zip(results) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("{} 任务执行失败: {}", ctx, e);
                    flow.finish_crashed(ctx, &e.to_string()).await
                }
            };
            report.attempted += 1;
            match result {
                FileResult::Purged => report.succeeded += 1,
                FileResult::Stopped => report.stopped += 1,
                FileResult::Skipped => {}
            }
        }

        let stopped = stop.is_stopped();
        ledger.close().await;
        drop(reset);

        if stopped {
            report.status = BatchStatus::Stopped;
            self.progress
                .record_message(STOPPED_BY_USER, Severity::Warning);
        } else {
            self.progress.record_message(
                format!(
                    "Successfully processed {} out of {} files",
                    report.succeeded, report.total
                ),
                Severity::Success,
            );
        }

        log_batch_complete(&report);
        Ok(report)
    }

    /// 扫描并发布摘要；扫描失败时记录错误并以空列表继续
    async fn scan(&self, folder: &Path, ledger: &Ledger) -> ScanSummary {
        let summary = match self.scanner.scan(folder, ledger).await {
            Ok(summary) => summary,
            Err(e) => {
                self.progress
                    .record_message(format!("Error scanning folder: {}", e), Severity::Error);
                return ScanSummary::default();
            }
        };

        for message in summary.messages(&self.file_label) {
            self.progress.record_message(message, Severity::Info);
        }
        for e in &summary.errors {
            self.progress
                .record_message(format!("Error scanning folder: {}", e), Severity::Warning);
        }
        summary
    }

    fn record_error(&self, e: &PurgeError) {
        let text = match e {
            PurgeError::Setup(inner) => inner.to_string(),
            other => other.to_string(),
        };
        self.progress.record_message(text, Severity::Error);
    }
}

/// 单个候选文件的任务：获取许可后执行流程，等待许可期间也响应停止
async fn process_candidate(
    flow: Arc<FileFlow>,
    semaphore: Arc<Semaphore>,
    stop: StopSignal,
    ctx: FileCtx,
) -> FileResult {
    let _permit = tokio::select! {
        biased;
        _ = stop.stopped() => return flow.finish_stopped(&ctx).await,
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return flow.finish_stopped(&ctx).await,
        },
    };
    flow.run(&ctx, &stop).await
}

fn clamp_concurrency(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
    if clamped != requested {
        warn!(
            "⚠️ 并发数 {} 超出范围 [{}, {}]，使用 {}",
            requested, MIN_CONCURRENCY, MAX_CONCURRENCY, clamped
        );
    }
    clamped
}
