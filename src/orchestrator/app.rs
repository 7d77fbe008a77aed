//! 应用入口 - 编排层
//!
//! 持有配置、文件夹注册表和批处理器，依次处理每个已注册的文件夹。
//! Ctrl-C 会请求停止当前批次，并跳过剩余的文件夹。

use crate::config::Config;
use crate::infrastructure::FolderRegistry;
use crate::models::{BatchReport, ProgressEvent};
use crate::orchestrator::batch_processor::FolderProcessor;
use crate::services::CommandMutator;
use crate::utils::logging::{log_folder_stats, log_startup, print_final_stats};
use crate::workflow::ProcessController;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    registry: FolderRegistry,
    processor: FolderProcessor,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        let registry = FolderRegistry::load(&config.registry_file);
        log_startup(&config, registry.folders().len());

        let mutator = Arc::new(CommandMutator::from_config(&config));
        let processor = FolderProcessor::from_config(&config, ProcessController::new(), mutator)?;

        Ok(Self {
            config,
            registry,
            processor,
        })
    }

    pub fn registry(&self) -> &FolderRegistry {
        &self.registry
    }

    pub fn processor(&self) -> &FolderProcessor {
        &self.processor
    }

    /// 注册文件夹并写回注册表
    pub fn register_folders<I>(&mut self, folders: I) -> Result<usize>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut added = 0;
        for folder in folders {
            if self.registry.add(folder) {
                added += 1;
            }
        }
        if added > 0 {
            self.registry.save()?;
            info!("📝 新注册 {} 个文件夹", added);
        }
        Ok(added)
    }

    /// 从注册表移除文件夹并写回，不存在的文件夹会被忽略
    pub fn unregister_folders<I>(&mut self, folders: I) -> Result<usize>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut removed = 0;
        for folder in folders {
            if self.registry.remove(&folder) {
                removed += 1;
            } else {
                warn!("⚠️ 注册表中没有该文件夹: {}", folder.display());
            }
        }
        if removed > 0 {
            self.registry.save()?;
            info!("🗑️ 已移除 {} 个文件夹", removed);
        }
        Ok(removed)
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Vec<BatchReport>> {
        let folders = self.registry.folders().to_vec();
        if folders.is_empty() {
            warn!("⚠️ 注册表中没有文件夹，程序结束");
            return Ok(Vec::new());
        }

        let shutdown = CancellationToken::new();
        let _stop_guard = shutdown.clone().drop_guard();
        self.spawn_ctrl_c_listener(shutdown.clone());
        self.spawn_progress_observer(shutdown.clone());

        let mut reports = Vec::with_capacity(folders.len());
        for folder in &folders {
            if shutdown.is_cancelled() {
                info!("⏹️ 已停止，跳过剩余文件夹");
                break;
            }

            if let Err(e) = self.processor.scanner().validate(folder).await {
                error!("❌ 跳过文件夹 {}: {}", folder.display(), e);
                continue;
            }
            match self.processor.folder_stats(folder).await {
                Ok(stats) => log_folder_stats(folder, &stats),
                Err(e) => warn!("⚠️ 无法统计文件夹 {}: {}", folder.display(), e),
            }

            match self
                .processor
                .run_batch(folder, self.config.concurrency)
                .await
            {
                Ok(report) => reports.push(report),
                Err(e) => error!("❌ 处理文件夹失败 {}: {}", folder.display(), e),
            }
        }

        print_final_stats(&reports, &self.config.log_file);
        Ok(reports)
    }

    fn spawn_ctrl_c_listener(&self, shutdown: CancellationToken) {
        let controller = self.processor.controller().clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("⚠️ 无法监听 Ctrl-C: {}", e);
                        return;
                    }
                    info!("🛑 收到 Ctrl-C，正在停止...");
                    controller.request_stop();
                    shutdown.cancel();
                }
            }
        });
    }

    /// 把进度事件转成终端上的一行状态
    fn spawn_progress_observer(&self, shutdown: CancellationToken) {
        let mut events = self.processor.progress().events();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(ProgressEvent::Progress { processed, total }) => {
                        info!("📈 Processed {}/{} files", processed, total);
                    }
                    Ok(ProgressEvent::BatchStarted { total }) => {
                        info!("📋 Starting to process {} files", total);
                    }
                    Ok(ProgressEvent::Message(_)) => {}
                    Err(RecvError::Lagged(n)) => debug!("进度观察者落后 {} 个事件", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
