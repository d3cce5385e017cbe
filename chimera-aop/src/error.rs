//! AOP 配置错误
//!
//! 所有配置期的失败都在构建时立即返回，不会延迟到方法调用时。
//! 目标方法和通知在调用期产生的错误使用 `anyhow::Error` 原样传播。

use chimera_core::ContainerError;
use thiserror::Error;

pub type AopResult<T> = Result<T, AopConfigError>;

#[derive(Debug, Error)]
pub enum AopConfigError {
    #[error("No advisors and no target source specified")]
    NoAdvisorsAndNoTarget,

    #[error("No interfaces to proxy for '{class}'")]
    NoProxiedInterfaces { class: String },

    #[error("Optimized proxy requires a static target source, got '{target_source}'")]
    StaticTargetRequired { target_source: String },

    #[error("Optimized proxy cannot expose the current proxy")]
    ExposeProxyNotSupported,

    #[error("Advice precedence circularity among advisors: {}", .advisors.join(", "))]
    PrecedenceCircularity { advisors: Vec<String> },

    #[error("Malformed pointcut '{expression}': {reason}")]
    MalformedPointcut { expression: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Cannot {operation}: proxy configuration is frozen")]
    ConfigFrozen { operation: &'static str },

    #[error("Advisor index {index} is out of bounds (0..{len})")]
    AdvisorIndexOutOfBounds { index: usize, len: usize },

    #[error("Cannot call '{method}': proxy is opaque")]
    OpaqueProxy { method: String },

    #[error("Cannot find current proxy: set 'expose_proxy' to make it available")]
    ProxyNotExposed,

    #[error("No method invocation found: add the expose-invocation advisor to the chain")]
    NoCurrentInvocation,

    #[error("Class '{class}' has no method invoker")]
    NoMethodInvoker { class: String },

    #[error("Failed to obtain target from '{target_source}': {message}")]
    TargetUnavailable { target_source: String, message: String },

    #[error("Target source returned no target for '{method}'")]
    NoTarget { method: String },

    #[error("Unknown interceptor bean '{name}': {reason}")]
    UnknownInterceptor { name: String, reason: String },

    #[error("Advisor registry is no longer available")]
    RegistryUnavailable,

    #[error("Statically registered aspect '{name}' failed to build: {message}")]
    StaticAspect { name: String, message: String },

    #[error("Target is not compatible with '{expected}' (got '{actual}')")]
    IncompatibleTarget { expected: String, actual: String },

    #[error("Proxy does not expose method '{method}'")]
    NoSuchMethod { method: String },

    #[error(transparent)]
    Container(#[from] ContainerError),
}
