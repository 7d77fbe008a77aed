//! 单个文件处理流程 - 流程层
//!
//! 核心职责：定义"一个文件"的完整处理流程
//!
//! 流程顺序：
//! 1. 检查停止信号
//! 2. 在阻塞线程池中调用变更服务
//! 3. 根据结果写账本、发进度消息、计数
//! 4. 瞬时失败时等待固定间隔后重试，次数耗尽后标记为跳过

use crate::config::Config;
use crate::error::MutationError;
use crate::models::{MutationOutcome, Severity};
use crate::services::{DocumentMutator, Ledger, ProgressAggregator, StopSignal};
use crate::workflow::file_ctx::FileCtx;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 重试策略（固定间隔，不做指数退避）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（至少 1）
    pub max_attempts: u32,
    /// 两次尝试之间的等待，最后一次失败后不等待
    pub retry_delay: Duration,
    /// 单次变更调用的超时
    pub mutation_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            mutation_timeout: None,
        }
    }

    pub fn with_mutation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.mutation_timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_attempts, config.retry_delay())
            .with_mutation_timeout(config.mutation_timeout())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// 单个文件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileResult {
    /// 变更成功，记为 purged
    Purged,
    /// 失败或重试耗尽，记为 skipped
    Skipped,
    /// 被停止，记为 skipped，不算错误
    Stopped,
}

/// 单个文件处理流程
///
/// - 编排一次带重试的文件处理
/// - 不持有并发许可，由编排层控制并发
/// - 只依赖业务能力（services）
pub struct FileFlow {
    mutator: Arc<dyn DocumentMutator>,
    ledger: Arc<Ledger>,
    progress: Arc<ProgressAggregator>,
    policy: RetryPolicy,
}

impl FileFlow {
    pub fn new(
        mutator: Arc<dyn DocumentMutator>,
        ledger: Arc<Ledger>,
        progress: Arc<ProgressAggregator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            mutator,
            ledger,
            progress,
            policy,
        }
    }

    pub async fn run(&self, ctx: &FileCtx, stop: &StopSignal) -> FileResult {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            if stop.is_stopped() {
                return self.finish_stopped(ctx).await;
            }

            debug!("{} 第 {}/{} 次尝试", ctx, attempt, max_attempts);
            let error = match self.attempt(ctx, stop).await {
                Ok(outcome) => return self.finish(ctx, outcome).await,
                Err(e) => e,
            };

            // 停止引起的失败（例如子进程随 Ctrl-C 一起退出）不算错误，也不重试
            if stop.is_stopped() {
                debug!("{} 停止后的尝试失败: {}", ctx, error);
                return self.finish_stopped(ctx).await;
            }

            error!("{} 第 {} 次尝试失败: {}", ctx, attempt, error);
            if attempt >= max_attempts {
                return self.finish_exhausted(ctx, &error).await;
            }

            self.progress.record_message(
                format!(
                    "Attempt {}/{} failed for {}: {}. Retrying in {}s",
                    attempt,
                    max_attempts,
                    ctx.file_name,
                    error,
                    self.policy.retry_delay.as_secs_f64()
                ),
                Severity::Warning,
            );

            tokio::select! {
                _ = stop.stopped() => return self.finish_stopped(ctx).await,
                _ = tokio::time::sleep(self.policy.retry_delay) => {}
            }
            attempt += 1;
        }
    }

    /// 在阻塞线程池中调用一次变更服务
    async fn attempt(&self, ctx: &FileCtx, stop: &StopSignal) -> Result<MutationOutcome, MutationError> {
        let mutator = self.mutator.clone();
        let path = ctx.path.clone();
        let signal = stop.with_timeout(self.policy.mutation_timeout);

        match tokio::task::spawn_blocking(move || mutator.mutate(&path, &signal)).await {
            Ok(result) => result,
            Err(e) => Err(MutationError::Other(format!("变更任务异常结束: {}", e))),
        }
    }

    async fn finish(&self, ctx: &FileCtx, outcome: MutationOutcome) -> FileResult {
        if outcome.is_stopped() {
            return self.finish_stopped(ctx).await;
        }

        let result = if outcome.success {
            self.ledger.mark_purged(&ctx.path).await;
            info!("{} ✓ 处理成功", ctx);
            self.progress.record_message(outcome.message, Severity::Success);
            FileResult::Purged
        } else {
            self.ledger.mark_skipped(&ctx.path).await;
            warn!("{} 处理失败，已标记为跳过", ctx);
            self.progress.record_message(outcome.message, Severity::Error);
            FileResult::Skipped
        };

        self.progress.record_progress();
        tokio::task::yield_now().await;
        result
    }

    async fn finish_exhausted(&self, ctx: &FileCtx, error: &MutationError) -> FileResult {
        error!("{} 已达到最大重试次数，跳过", ctx);
        self.ledger.mark_skipped(&ctx.path).await;
        self.progress.record_message(
            format!(
                "Failed to process {} after {} attempts: {}",
                ctx.file_name, self.policy.max_attempts, error
            ),
            Severity::Error,
        );
        self.progress.record_progress();
        tokio::task::yield_now().await;
        FileResult::Skipped
    }

    /// 任务本身异常结束（panic 或被取消）：按跳过处理并上报
    pub async fn finish_crashed(&self, ctx: &FileCtx, reason: &str) -> FileResult {
        self.ledger.mark_skipped(&ctx.path).await;
        self.progress.record_message(
            format!("Failed to process {}: {}", ctx.file_name, reason),
            Severity::Error,
        );
        self.progress.record_progress();
        FileResult::Skipped
    }

    /// 停止导致的未完成：标记跳过并计数，但不作为错误上报
    pub async fn finish_stopped(&self, ctx: &FileCtx) -> FileResult {
        debug!("{} 已停止", ctx);
        self.ledger.mark_skipped(&ctx.path).await;
        self.progress.record_progress();
        FileResult::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackStatus;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// 前 `failures` 次返回瞬时错误，之后成功
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl DocumentMutator for Flaky {
        fn mutate(&self, path: &Path, _stop: &StopSignal) -> Result<MutationOutcome, MutationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(MutationError::Other(format!("transient #{call}")));
            }
            Ok(MutationOutcome::success(format!(
                "Successfully processed {}",
                path.display()
            )))
        }
    }

    struct Setup {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        progress: Arc<ProgressAggregator>,
        ctx: FileCtx,
    }

    async fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::load(dir.path(), 8).await.unwrap());
        let progress = Arc::new(ProgressAggregator::new(100));
        progress.start_batch(1);
        let ctx = FileCtx::new(dir.path().join("bilag_1.pdf"), 1, 1);
        Setup {
            _dir: dir,
            ledger,
            progress,
            ctx,
        }
    }

    fn policy(delay_ms: u64) -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(delay_ms))
    }

    #[tokio::test]
    async fn test_transient_error_then_success() {
        let s = setup().await;
        let mutator = Arc::new(Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let flow = FileFlow::new(mutator.clone(), s.ledger.clone(), s.progress.clone(), policy(10));

        let result = flow.run(&s.ctx, &StopSignal::never()).await;

        assert_eq!(result, FileResult::Purged);
        assert_eq!(mutator.calls.load(Ordering::SeqCst), 2);
        assert!(s.ledger.is_resolved(&s.ctx.path));
        let snapshot = s.progress.snapshot();
        assert_eq!(snapshot.processed_files, 1);
        assert_eq!(snapshot.messages_with(Severity::Warning).count(), 1);
        assert_eq!(snapshot.messages_with(Severity::Success).count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_skipped() {
        let s = setup().await;
        let mutator = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let flow = FileFlow::new(mutator.clone(), s.ledger.clone(), s.progress.clone(), policy(40));

        let started = Instant::now();
        let result = flow.run(&s.ctx, &StopSignal::never()).await;

        assert_eq!(result, FileResult::Skipped);
        assert_eq!(mutator.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(80));
        let snapshot = s.progress.snapshot();
        assert_eq!(snapshot.processed_files, 1);
        let errors: Vec<_> = snapshot.messages_with(Severity::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text.starts_with("Failed to process bilag_1.pdf after 3 attempts"));
    }

    #[tokio::test]
    async fn test_failure_outcome_is_not_retried() {
        let s = setup().await;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mutator = move |_: &Path, _: &StopSignal| -> Result<MutationOutcome, MutationError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(MutationOutcome::failure("Failed to open file"))
        };
        let flow = FileFlow::new(Arc::new(mutator), s.ledger.clone(), s.progress.clone(), policy(10));

        let result = flow.run(&s.ctx, &StopSignal::never()).await;

        assert_eq!(result, FileResult::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            s.progress.snapshot().last_message().map(|m| m.severity),
            Some(Severity::Error)
        );
    }

    #[tokio::test]
    async fn test_stopped_before_attempt() {
        let s = setup().await;
        let mutator = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let flow = FileFlow::new(mutator.clone(), s.ledger.clone(), s.progress.clone(), policy(10));
        let token = CancellationToken::new();
        token.cancel();

        let result = flow.run(&s.ctx, &StopSignal::new(token)).await;

        assert_eq!(result, FileResult::Stopped);
        assert_eq!(mutator.calls.load(Ordering::SeqCst), 0);
        assert!(s.ledger.is_resolved(&s.ctx.path));
        let snapshot = s.progress.snapshot();
        assert_eq!(snapshot.processed_files, 1);
        assert_eq!(snapshot.messages_with(Severity::Error).count(), 0);
    }

    #[tokio::test]
    async fn test_stop_during_retry_delay() {
        let s = setup().await;
        let mutator = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let flow = FileFlow::new(
            mutator.clone(),
            s.ledger.clone(),
            s.progress.clone(),
            RetryPolicy::new(3, Duration::from_secs(30)),
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = flow.run(&s.ctx, &StopSignal::new(token)).await;

        assert_eq!(result, FileResult::Stopped);
        assert_eq!(mutator.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_error_after_stop_is_not_reported() {
        let s = setup().await;
        let token = CancellationToken::new();
        let canceller = token.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        // 子进程和主进程一起收到 SIGINT 的情形
        let mutator = move |_: &Path, _: &StopSignal| -> Result<MutationOutcome, MutationError> {
            counter.fetch_add(1, Ordering::SeqCst);
            canceller.cancel();
            Err(MutationError::Terminated("signal: 2 (SIGINT)".to_string()))
        };
        let flow = FileFlow::new(
            Arc::new(mutator),
            s.ledger.clone(),
            s.progress.clone(),
            RetryPolicy::new(1, Duration::from_millis(10)),
        );

        let result = flow.run(&s.ctx, &StopSignal::new(token)).await;

        assert_eq!(result, FileResult::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.ledger.status_of(&s.ctx.path), Some(TrackStatus::Skipped));
        let snapshot = s.progress.snapshot();
        assert_eq!(snapshot.processed_files, 1);
        assert_eq!(snapshot.messages_with(Severity::Error).count(), 0);
        assert_eq!(snapshot.messages_with(Severity::Warning).count(), 0);
    }
}
