//! 文档变更能力 - 业务能力层
//!
//! 具体的文件变更（修复、删空页、去图片……）由外部实现，
//! 这里只定义边界：`DocumentMutator` 和传给它的 `StopSignal`。

use crate::error::MutationError;
use crate::models::MutationOutcome;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// 批次的停止信号
///
/// 从 `ProcessController` 获取，克隆后分发给每个任务，
/// 可以附加单次调用的截止时间。
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// 永远不会被触发的信号（测试或单独调用时使用）
    pub fn never() -> Self {
        Self::new(CancellationToken::new())
    }

    /// 附加截止时间后的副本
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        Self {
            token: self.token.clone(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// 批次是否仍在运行
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 等待停止
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// 文档变更服务
///
/// 实现方是计算密集的同步代码，编排层会在阻塞线程池中调用。
///
/// 约定：
/// - 在较长的内部操作中以细粒度轮询 `stop.is_active()`，
///   停止后尽快返回 `MutationOutcome::stopped()`
/// - `Ok(outcome)` 是确定的结果，不会重试
/// - `Err(_)` 是瞬时失败，由编排层按重试策略重试
pub trait DocumentMutator: Send + Sync + 'static {
    fn mutate(&self, path: &Path, stop: &StopSignal) -> Result<MutationOutcome, MutationError>;
}

impl<F> DocumentMutator for F
where
    F: Fn(&Path, &StopSignal) -> Result<MutationOutcome, MutationError> + Send + Sync + 'static,
{
    fn mutate(&self, path: &Path, stop: &StopSignal) -> Result<MutationOutcome, MutationError> {
        self(path, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_follows_token() {
        let token = CancellationToken::new();
        let signal = StopSignal::new(token.clone());
        let copy = signal.with_timeout(None);

        assert!(signal.is_active());
        token.cancel();
        assert!(!signal.is_active());
        assert!(copy.is_stopped());
    }

    #[test]
    fn test_deadline() {
        let signal = StopSignal::never();
        assert!(!signal.deadline_exceeded());

        let expired = signal.with_timeout(Some(Duration::ZERO));
        assert!(expired.deadline_exceeded());
        assert!(expired.is_active());
    }

    #[test]
    fn test_closure_mutator() {
        let mutator = |path: &Path, _stop: &StopSignal| -> Result<MutationOutcome, MutationError> {
            Ok(MutationOutcome::success(format!("done {}", path.display())))
        };
        let outcome = mutator
            .mutate(Path::new("bilag_1.pdf"), &StopSignal::never())
            .unwrap();
        assert!(outcome.success);
    }
}
