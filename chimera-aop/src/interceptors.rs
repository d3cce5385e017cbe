//! 内置通知
//!
//! 这些通知只通过 `tracing` 记录信息，不改变调用结果。

use crate::advice::{AfterThrowingAdvice, AroundAdvice};
use crate::error_info::ErrorInfo;
use crate::joinpoint::{JoinPoint, MethodInvocation};
use chimera_core::reflect::Value;
use std::sync::Arc;
use std::time::Duration;

/// 记录方法进入和退出
#[derive(Debug, Clone, Default)]
pub struct TraceInterceptor {
    log_args: bool,
}

impl TraceInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl AroundAdvice for TraceInterceptor {
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value> {
        let signature = invocation.signature();
        if self.log_args {
            tracing::info!("→ Entering: {} with {:?}", signature, invocation.args());
        } else {
            tracing::info!("→ Entering: {}", signature);
        }

        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", signature, invocation.elapsed()),
            Err(e) => tracing::info!(
                "← Exiting: {} with error '{}' (took {:?})",
                signature,
                e,
                invocation.elapsed()
            ),
        }
        result
    }
}

/// 慢调用告警
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.threshold
    }
}

impl Default for PerformanceMonitorInterceptor {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl AroundAdvice for PerformanceMonitorInterceptor {
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value> {
        let result = invocation.proceed();
        let elapsed = invocation.elapsed();
        if self.is_slow(elapsed) {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                invocation.signature(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::trace!("{} took {:?}", invocation.signature(), elapsed);
        }
        result
    }
}

type ErrorListener = Arc<dyn Fn(&JoinPoint, &ErrorInfo) + Send + Sync>;

/// 记录目标方法返回的错误，错误随后照常向外传播
#[derive(Clone, Default)]
pub struct ExceptionLoggingAdvice {
    listener: Option<ErrorListener>,
}

impl ExceptionLoggingAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 额外把错误信息交给回调（例如上报）
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&JoinPoint, &ErrorInfo) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }
}

impl AfterThrowingAdvice for ExceptionLoggingAdvice {
    fn after_throwing(&self, invocation: &MethodInvocation<'_>, error: &anyhow::Error) -> anyhow::Result<()> {
        let info = ErrorInfo::from_anyhow(error);
        tracing::error!(
            "Exception in {} [{}]: {}",
            invocation.signature(),
            info.error_type,
            info.full_description()
        );

        if let Some(listener) = &self.listener {
            listener(&invocation.join_point(), &info);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExceptionLoggingAdvice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionLoggingAdvice")
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
