//! 外部命令变更服务 - 业务能力层
//!
//! 对每个候选文件运行一次配置好的外部程序，参数中的 `{file}` 替换为文件路径。
//! 运行期间轮询停止信号和截止时间，触发时结束子进程。

use crate::config::Config;
use crate::error::MutationError;
use crate::models::MutationOutcome;
use crate::services::mutation::{DocumentMutator, StopSignal};
use crate::utils::display_name;
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 参数中的文件路径占位符
pub const FILE_PLACEHOLDER: &str = "{file}";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 外部命令变更服务
#[derive(Debug, Clone)]
pub struct CommandMutator {
    program: String,
    args: Vec<String>,
    poll_interval: Duration,
}

impl CommandMutator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.mutator_program.clone(), config.mutator_args.clone())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 替换占位符；没有占位符时把路径追加为最后一个参数
    fn build_args(&self, path: &Path) -> Vec<OsString> {
        let file = path.to_string_lossy();
        let mut has_placeholder = false;
        let mut args: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(FILE_PLACEHOLDER) {
                    has_placeholder = true;
                    OsString::from(arg.replace(FILE_PLACEHOLDER, &file))
                } else {
                    OsString::from(arg)
                }
            })
            .collect();
        if !has_placeholder {
            args.push(path.as_os_str().to_owned());
        }
        args
    }
}

impl DocumentMutator for CommandMutator {
    fn mutate(&self, path: &Path, stop: &StopSignal) -> Result<MutationOutcome, MutationError> {
        let file_name = display_name(path);
        if !stop.is_active() {
            return Ok(MutationOutcome::stopped());
        }

        info!("🔧 开始处理 {}", file_name);
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(self.build_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if !stop.is_active() {
                terminate(&mut child);
                info!("⏹️ {} 的处理已被停止", file_name);
                return Ok(MutationOutcome::stopped());
            }
            if stop.deadline_exceeded() {
                terminate(&mut child);
                return Err(MutationError::TimedOut(started.elapsed()));
            }
            std::thread::sleep(self.poll_interval);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        debug!(
            "{} 退出: {} (耗时 {:?})",
            file_name,
            status,
            started.elapsed()
        );

        if status.success() {
            let message = last_line(&stdout)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Successfully processed {}", file_name));
            return Ok(MutationOutcome::success(message));
        }

        match status.code() {
            Some(code) => {
                let reason = last_line(&stderr)
                    .or_else(|| last_line(&stdout))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("exit code {}", code));
                Ok(MutationOutcome::failure(format!(
                    "Failed to process {}: {}",
                    file_name, reason
                )))
            }
            None => Err(MutationError::Terminated(status.to_string())),
        }
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<String>> {
    reader.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("⚠️ 结束变更进程失败: {}", e);
    }
    let _ = child.wait();
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}
