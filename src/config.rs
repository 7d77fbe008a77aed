use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 并发数下限
pub const MIN_CONCURRENCY: usize = 1;
/// 并发数上限
pub const MAX_CONCURRENCY: usize = 16;
/// 默认并发数
pub const DEFAULT_CONCURRENCY: usize = 4;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的文件数量（1-16）
    pub concurrency: usize,
    /// 每个文件的最大尝试次数
    pub max_attempts: u32,
    /// 两次尝试之间的固定等待（秒）
    pub retry_delay_secs: u64,
    /// 单次变更调用的超时（秒），0 表示不限制
    pub mutation_timeout_secs: u64,
    /// 候选文件名匹配模式（正则）
    pub candidate_pattern: String,
    /// 进度消息中使用的文件类型名称
    pub file_label: String,
    /// 进度消息日志的最大条数
    pub message_log_capacity: usize,
    /// 账本后台写入队列容量
    pub ledger_queue_capacity: usize,
    /// 文件夹注册表路径
    pub registry_file: String,
    /// 输出日志文件
    pub log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 外部变更命令 ---
    pub mutator_program: String,
    pub mutator_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: 3,
            retry_delay_secs: 5,
            mutation_timeout_secs: 0,
            candidate_pattern: r"(?i)^bilag_.*\.pdf$".to_string(),
            file_label: "PDF".to_string(),
            message_log_capacity: 1000,
            ledger_queue_capacity: 256,
            registry_file: "purger_state.json".to_string(),
            log_file: "pdf_purger.log".to_string(),
            verbose_logging: false,
            mutator_program: "pdf-purge-file".to_string(),
            mutator_args: vec!["{file}".to_string()],
        }
    }
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（若存在）→ 环境变量覆盖 → 校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| {
                ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 用 `PURGER_*` 环境变量覆盖当前值
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse("PURGER_CONCURRENCY")? {
            self.concurrency = v;
        }
        if let Some(v) = env_parse("PURGER_MAX_ATTEMPTS")? {
            self.max_attempts = v;
        }
        if let Some(v) = env_parse("PURGER_RETRY_DELAY_SECS")? {
            self.retry_delay_secs = v;
        }
        if let Some(v) = env_parse("PURGER_MUTATION_TIMEOUT_SECS")? {
            self.mutation_timeout_secs = v;
        }
        if let Some(v) = env_parse("PURGER_MESSAGE_LOG_CAPACITY")? {
            self.message_log_capacity = v;
        }
        if let Some(v) = env_parse("PURGER_LEDGER_QUEUE_CAPACITY")? {
            self.ledger_queue_capacity = v;
        }
        if let Some(v) = env_parse("PURGER_VERBOSE_LOGGING")? {
            self.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("PURGER_CANDIDATE_PATTERN") {
            self.candidate_pattern = v;
        }
        if let Ok(v) = std::env::var("PURGER_FILE_LABEL") {
            self.file_label = v;
        }
        if let Ok(v) = std::env::var("PURGER_REGISTRY_FILE") {
            self.registry_file = v;
        }
        if let Ok(v) = std::env::var("PURGER_LOG_FILE") {
            self.log_file = v;
        }
        if let Ok(v) = std::env::var("PURGER_MUTATOR_PROGRAM") {
            self.mutator_program = v;
        }
        if let Ok(v) = std::env::var("PURGER_MUTATOR_ARGS") {
            self.mutator_args = v.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }

    /// 校验取值范围和匹配模式
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "concurrency",
            self.concurrency as u64,
            MIN_CONCURRENCY as u64,
            MAX_CONCURRENCY as u64,
        )?;
        check_range("max_attempts", self.max_attempts as u64, 1, 100)?;
        check_range(
            "message_log_capacity",
            self.message_log_capacity as u64,
            1,
            u64::MAX,
        )?;
        check_range(
            "ledger_queue_capacity",
            self.ledger_queue_capacity as u64,
            1,
            u64::MAX,
        )?;
        regex::Regex::new(&self.candidate_pattern)?;
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// 单次变更调用的超时，未配置时返回 `None`
    pub fn mutation_timeout(&self) -> Option<Duration> {
        (self.mutation_timeout_secs > 0).then(|| Duration::from_secs(self.mutation_timeout_secs))
    }
}

fn env_parse<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.mutation_timeout(), None);
    }

    #[test]
    fn test_concurrency_out_of_range() {
        let config = Config {
            concurrency: 17,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "concurrency",
                ..
            })
        ));

        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("concurrency = 8\nretry_delay_secs = 1\n").unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry_delay_secs, 1);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.file_label, "PDF");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = Config {
            candidate_pattern: "(".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.candidate_pattern, Config::default().candidate_pattern);
    }
}
