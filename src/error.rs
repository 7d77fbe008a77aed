use std::path::PathBuf;
use thiserror::Error;

/// 批次错误类型
///
/// 注册表、配置和变更服务的错误各自独立：前两者在程序边界经 `anyhow` 传播，
/// 变更错误在 `FileFlow` 内部消化为重试或跳过。
#[derive(Debug, Error)]
pub enum PurgeError {
    /// 文件夹准备 / 校验错误（对整个批次是致命的）
    #[error("准备文件夹失败: {0}")]
    Setup(#[from] SetupError),
    /// 追踪账本错误
    #[error("账本错误: {0}")]
    Ledger(#[from] LedgerError),
    /// 扫描错误
    #[error("扫描文件夹失败 ({path}): {message}")]
    Scan { path: PathBuf, message: String },
}

/// 文件夹准备 / 校验错误
#[derive(Debug, Error)]
pub enum SetupError {
    /// 文件夹不存在
    #[error("Folder does not exist: {}", path.display())]
    NotFound { path: PathBuf },
    /// 路径不是目录
    #[error("Path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },
    /// 没有写权限
    #[error("No write permission in folder {}: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 创建目录或追踪文件失败
    #[error("Error preparing folders at {}: {source}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 追踪账本错误
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 读取追踪文件失败（包括非 UTF-8 内容）
    #[error("读取追踪文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 追加写入失败
    #[error("追加写入追踪文件失败 ({}): {source}", path.display())]
    AppendFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 文件夹注册表错误
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("读写注册表文件失败 ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("注册表 JSON 无效 ({}): {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 文档变更服务的瞬时错误，会被编排层重试
#[derive(Debug, Error)]
pub enum MutationError {
    /// 启动或等待外部进程失败
    #[error("变更进程 IO 错误: {0}")]
    Io(#[from] std::io::Error),
    /// 单次调用超时
    #[error("变更调用超时 ({0:?})")]
    TimedOut(std::time::Duration),
    /// 外部进程被信号终止
    #[error("变更进程异常退出: {0}")]
    Terminated(String),
    /// 其他瞬时失败
    #[error("{0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 取值超出范围
    #[error("配置项 {field} 超出范围: {value} (允许 {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    /// 文件名匹配模式无效
    #[error("文件名匹配模式无效: {0}")]
    InvalidPattern(#[from] regex::Error),
}

// ========== 便捷构造函数 ==========

impl PurgeError {
    /// 创建扫描错误
    pub fn scan(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PurgeError::Scan {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, PurgeError>;
