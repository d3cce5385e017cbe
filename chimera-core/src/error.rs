//! 容器与反射错误类型
//!
//! 注册表相关的失败使用 `ContainerError`，反射调用相关的失败使用 `ReflectionError`。
//! 目标方法本身抛出的业务错误统一使用 `anyhow::Error`，不在此定义。

use thiserror::Error;

/// 容器操作结果
pub type ContainerResult<T> = Result<T, ContainerError>;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No bean named '{0}' is registered")]
    BeanNotFound(String),

    #[error("A bean named '{0}' is already registered")]
    DuplicateBean(String),

    #[error("Bean '{0}' is currently in creation")]
    CurrentlyInCreation(String),

    #[error("Failed to create bean '{name}': {message}")]
    BeanCreationFailed { name: String, message: String },

    #[error("Bean '{name}' is not of type '{expected}'")]
    BeanTypeMismatch { name: String, expected: &'static str },

    #[error("Post-processor '{processor}' failed on bean '{bean}': {message}")]
    PostProcessingFailed {
        bean: String,
        processor: String,
        message: String,
    },

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 反射调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflectionError {
    #[error("No method '{method}' on '{class}'")]
    NoSuchMethod { class: String, method: String },

    #[error("Argument index {index} out of range ({len} arguments)")]
    ArgumentIndex { index: usize, len: usize },

    #[error("Argument {index} is not of type '{expected}'")]
    ArgumentType { index: usize, expected: &'static str },

    #[error("Target is not an instance of '{expected}'")]
    TargetType { expected: &'static str },

    #[error("Value is not of type '{expected}'")]
    ValueType { expected: &'static str },
}
