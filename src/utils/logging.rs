/// 日志工具模块
///
/// 初始化 tracing（终端 + 日志文件），以及批次相关的日志输出辅助函数
use crate::config::Config;
use crate::models::{BatchReport, FolderStats};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，开启 `verbose_logging` 时为 `debug`。
/// 日志同时写到 stderr 和 `config.log_file`（追加模式）。
pub fn init(config: &Config) -> Result<()> {
    init_log_file(&config.log_file)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("无法打开日志文件: {}", config.log_file))?;

    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("初始化日志失败")?;
    Ok(())
}

/// 在日志文件中写入本次运行的分隔头
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "\n{}\nPDF Purger 运行日志 - {}\n{}\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    file.write_all(log_header.as_bytes())?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, folder_count: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文件夹批处理模式");
    info!("📁 已注册文件夹: {}", folder_count);
    info!("📊 并发数: {}", config.concurrency);
    info!(
        "🔁 重试: 最多 {} 次，间隔 {} 秒",
        config.max_attempts, config.retry_delay_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `folder`: 文件夹
/// - `concurrency`: 实际使用的并发数
pub fn log_batch_start(folder: &Path, concurrency: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理文件夹: {}", folder.display());
    info!("📊 并发数: {}", concurrency);
    info!("{}", "=".repeat(60));
}

/// 记录文件夹统计
pub fn log_folder_stats(folder: &Path, stats: &FolderStats) {
    info!(
        "📁 {}: 共 {} 个文件，已处理 {}，已跳过 {}，待处理 {}",
        folder.display(),
        stats.total_files,
        stats.purged_files,
        stats.skipped_files,
        stats.pending_files
    );
}

/// 记录批次完成信息
pub fn log_batch_complete(report: &BatchReport) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 批次完成 [{:?}]: 成功 {}/{}，停止 {}",
        report.status, report.succeeded, report.total, report.stopped
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `reports`: 每个文件夹的批次结果
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(reports: &[BatchReport], log_file_path: &str) {
    let total: usize = reports.iter().map(|r| r.total).sum();
    let succeeded: usize = reports.iter().map(|r| r.succeeded).sum();
    let failed: usize = reports.iter().map(|r| r.failed()).sum();

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for report in reports {
        info!("📁 {}", report);
    }
    info!("✅ 成功: {}/{}", succeeded, total);
    info!("❌ 失败或跳过: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}
