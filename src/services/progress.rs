//! 进度汇总 - 业务能力层
//!
//! 批次内唯一的进度持有者：计数、进度比例、消息日志。
//! 每次状态变化后发布一次快照（`watch`），消息另外作为离散事件发布（`broadcast`）。

use crate::models::{BatchProgress, ProgressEvent, ProgressMessage, Severity};
use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct State {
    total_files: usize,
    processed_files: usize,
    progress_fraction: f64,
    status_text: String,
    messages: VecDeque<ProgressMessage>,
    dropped_messages: usize,
}

impl State {
    fn snapshot(&self) -> BatchProgress {
        BatchProgress {
            total_files: self.total_files,
            processed_files: self.processed_files,
            progress_fraction: self.progress_fraction,
            status_text: self.status_text.clone(),
            messages: self.messages.iter().cloned().collect(),
            dropped_messages: self.dropped_messages,
        }
    }
}

/// 进度汇总器
///
/// 所有修改都在同一把锁内完成，并发的递增不会丢失或重复计数。
#[derive(Debug)]
pub struct ProgressAggregator {
    state: Mutex<State>,
    capacity: usize,
    snapshots: watch::Sender<BatchProgress>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressAggregator {
    /// `capacity` 为消息日志保留的最大条数
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (snapshots, _) = watch::channel(BatchProgress::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                total_files: 0,
                processed_files: 0,
                progress_fraction: 0.0,
                status_text: String::new(),
                messages: VecDeque::with_capacity(capacity.min(1024)),
                dropped_messages: 0,
            }),
            capacity,
            snapshots,
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 开始新批次：重置计数、清空消息、设置总数
    pub fn start_batch(&self, total: usize) {
        let mut state = self.state();
        state.total_files = total;
        state.processed_files = 0;
        state.progress_fraction = 0.0;
        state.status_text = format!("Starting to process {} files", total);
        state.messages.clear();
        state.dropped_messages = 0;
        self.publish(&state, ProgressEvent::BatchStarted { total });
    }

    /// 记录一条消息
    pub fn record_message(&self, text: impl Into<String>, severity: Severity) {
        let message = ProgressMessage {
            text: text.into(),
            severity,
            timestamp: Local::now(),
        };

        match severity {
            Severity::Error => error!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Info | Severity::Success => info!("{}", message),
        }

        let mut state = self.state();
        if state.messages.len() >= self.capacity {
            state.messages.pop_front();
            state.dropped_messages += 1;
        }
        state.messages.push_back(message.clone());
        self.publish(&state, ProgressEvent::Message(message));
    }

    /// 已处理数加一
    pub fn record_progress(&self) {
        self.record_progress_by(1);
    }

    /// 已处理数增加 `delta`，不会超过总数
    pub fn record_progress_by(&self, delta: usize) {
        let mut state = self.state();
        state.processed_files = state
            .processed_files
            .saturating_add(delta)
            .min(state.total_files);
        if state.total_files > 0 {
            let fraction = state.processed_files as f64 / state.total_files as f64;
            state.progress_fraction = fraction.clamp(0.0, 1.0).max(state.progress_fraction);
        }
        state.status_text = format!(
            "Processed {}/{} files",
            state.processed_files, state.total_files
        );
        let event = ProgressEvent::Progress {
            processed: state.processed_files,
            total: state.total_files,
        };
        self.publish(&state, event);
    }

    /// 当前进度的不可变副本
    pub fn snapshot(&self) -> BatchProgress {
        self.state().snapshot()
    }

    /// 订阅快照（只保留最新一份）
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.snapshots.subscribe()
    }

    /// 订阅离散事件
    pub fn events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// 在持有锁时发布，保证观察者看到的快照顺序与修改顺序一致
    fn publish(&self, state: &State, event: ProgressEvent) {
        self.snapshots.send_replace(state.snapshot());
        let _ = self.events.send(event);
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_batch_resets_state() {
        let progress = ProgressAggregator::new(10);
        progress.record_message("scan", Severity::Info);
        progress.start_batch(4);
        progress.record_progress();

        progress.start_batch(2);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.processed_files, 0);
        assert_eq!(snapshot.progress_fraction, 0.0);
        assert!(snapshot.messages.is_empty());
    }

    #[test]
    fn test_processed_never_exceeds_total() {
        let progress = ProgressAggregator::new(10);
        progress.start_batch(2);
        progress.record_progress();
        progress.record_progress();
        progress.record_progress();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.processed_files, 2);
        assert_eq!(snapshot.progress_fraction, 1.0);
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.status_text, "Processed 2/2 files");
    }

    #[test]
    fn test_message_log_is_bounded() {
        let progress = ProgressAggregator::new(3);
        for i in 0..5 {
            progress.record_message(format!("m{i}"), Severity::Info);
        }

        let snapshot = progress.snapshot();
        let texts: Vec<_> = snapshot.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
        assert_eq!(snapshot.dropped_messages, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_and_monotonic_snapshots() {
        let progress = Arc::new(ProgressAggregator::new(10));
        progress.start_batch(200);
        let mut rx = progress.subscribe();

        let watcher = tokio::spawn(async move {
            let mut last = 0.0;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                assert!(snapshot.progress_fraction >= last);
                assert!(snapshot.processed_files <= snapshot.total_files);
                last = snapshot.progress_fraction;
                if snapshot.is_complete() {
                    break;
                }
            }
        });

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let progress = progress.clone();
                tokio::spawn(async move { progress.record_progress() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        watcher.await.unwrap();
        assert_eq!(progress.snapshot().processed_files, 200);
    }

    #[tokio::test]
    async fn test_messages_are_broadcast_as_events() {
        let progress = ProgressAggregator::new(10);
        let mut events = progress.events();

        progress.record_message("hello", Severity::Warning);

        match events.recv().await.unwrap() {
            ProgressEvent::Message(m) => {
                assert_eq!(m.text, "hello");
                assert_eq!(m.severity, Severity::Warning);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
