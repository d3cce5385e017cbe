//! 错误信息结构
//!
//! 提供结构化的错误信息传递给 after-throwing 通知

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,

    /// 根错误的类型名称（无法识别时为 "anyhow::Error"）
    pub error_type: String,

    /// 错误源链（cause chain），不含最外层消息
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let source_chain = error.chain().skip(1).map(|cause| cause.to_string()).collect();

        Self {
            message: error.to_string(),
            error_type: Self::type_of(error),
            source_chain,
        }
    }

    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    fn type_of(error: &anyhow::Error) -> String {
        if error.downcast_ref::<crate::AopConfigError>().is_some() {
            std::any::type_name::<crate::AopConfigError>().to_string()
        } else if error.downcast_ref::<chimera_core::ReflectionError>().is_some() {
            std::any::type_name::<chimera_core::ReflectionError>().to_string()
        } else if error.downcast_ref::<std::io::Error>().is_some() {
            std::any::type_name::<std::io::Error>().to_string()
        } else {
            "anyhow::Error".to_string()
        }
    }

    /// 完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.error_type)
    }
}
