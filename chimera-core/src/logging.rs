//! 日志初始化
//!
//! 基于 tracing-subscriber。配置来自 `Environment` 的 `logging.*` 键，
//! `RUST_LOG` 存在时覆盖过滤规则。拦截器链的解析和代理创建日志位于
//! `chimera_aop` 目标下，可以用 `logging.aop-level` 单独调整。

use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as subscriber, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑格式（默认）
    Compact,
    Full,
    Json,
    /// 多行，适合开发时阅读拦截器链
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,

    /// `chimera_aop` 目标的级别，未设置时跟随 `level`
    pub aop_level: Option<LogLevel>,

    pub format: LogFormat,

    pub show_timestamp: bool,

    pub show_target: bool,

    pub show_thread_names: bool,

    /// 完整的过滤规则，例如 `"chimera_aop=trace,my_app=debug"`，设置后忽略级别
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            aop_level: None,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn aop_level(mut self, level: LogLevel) -> Self {
        self.aop_level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_timestamp(mut self, show: bool) -> Self {
        self.show_timestamp = show;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 读取 `logging.level`、`logging.aop-level`、`logging.format`、`logging.filter`、
    /// `logging.show-target`、`logging.show-timestamp`、`logging.show-thread-names`
    ///
    /// 无法解析的值保留默认。
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| env.get_string(key).and_then(|s| s.parse().ok());

        Self {
            level: parsed("logging.level").unwrap_or(defaults.level),
            aop_level: parsed("logging.aop-level"),
            format: env
                .get_string("logging.format")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.format),
            show_timestamp: env.get_bool_or("logging.show-timestamp", defaults.show_timestamp),
            show_target: env.get_bool_or("logging.show-target", defaults.show_target),
            show_thread_names: env.get_bool_or("logging.show-thread-names", defaults.show_thread_names),
            filter: env.get_string("logging.filter").filter(|f| !f.trim().is_empty()),
        }
    }

    /// 过滤规则：`RUST_LOG` 优先，其次 `filter`，最后由级别拼出
    pub fn directives(&self) -> String {
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if !rust_log.trim().is_empty() {
                return rust_log;
            }
        }
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        match self.aop_level {
            Some(aop) => format!("{},chimera_aop={}", self.level, aop),
            None => self.level.to_string(),
        }
    }

    /// 安装全局订阅者，重复安装返回 `LoggingInitFailed`
    pub fn init(self) -> ContainerResult<()> {
        let directives = self.directives();
        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| ContainerError::LoggingInitFailed(format!("invalid filter '{}': {}", directives, e)))?;

        let builder = subscriber()
            .with_env_filter(filter)
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names);

        let installed = match (self.format, self.show_timestamp) {
            (LogFormat::Compact, true) => builder.compact().try_init(),
            (LogFormat::Compact, false) => builder.compact().without_time().try_init(),
            (LogFormat::Full, true) => builder.try_init(),
            (LogFormat::Full, false) => builder.without_time().try_init(),
            (LogFormat::Json, _) => builder.json().try_init(),
            (LogFormat::Pretty, _) => builder.pretty().try_init(),
        };
        installed.map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))?;

        tracing::debug!("Logging initialized ({:?}, filter '{}')", self.format, directives);
        Ok(())
    }
}
