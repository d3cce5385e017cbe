//! 调用上下文
//!
//! 当前代理和当前调用按线程保存在栈上，只在调用期间可见，
//! 调用结束（包括返回错误）时自动出栈。两者都需要显式开启。

use crate::advice::{Advice, AroundAdvice};
use crate::advisor::{Advisor, HIGHEST_PRECEDENCE};
use crate::error::{AopConfigError, AopResult};
use crate::joinpoint::{JoinPoint, MethodInvocation};
use crate::proxy::AopProxy;
use chimera_core::reflect::Value;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT_PROXY: RefCell<Vec<Arc<AopProxy>>> = const { RefCell::new(Vec::new()) };
    static CURRENT_INVOCATION: RefCell<Vec<JoinPoint>> = const { RefCell::new(Vec::new()) };
}

/// 当前代理
pub struct AopContext;

impl AopContext {
    /// 当前线程正在执行的代理调用所属的代理
    ///
    /// 只有 `expose_proxy` 打开时才可用，用于在目标内部经由代理调用自身的其他方法
    pub fn current_proxy() -> AopResult<Arc<AopProxy>> {
        CURRENT_PROXY
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(AopConfigError::ProxyNotExposed)
    }

    pub(crate) fn expose(proxy: &Arc<AopProxy>) -> ProxyExposure {
        CURRENT_PROXY.with(|stack| stack.borrow_mut().push(Arc::clone(proxy)));
        ProxyExposure { _private: () }
    }
}

/// 出栈守卫
pub(crate) struct ProxyExposure {
    _private: (),
}

impl Drop for ProxyExposure {
    fn drop(&mut self) {
        CURRENT_PROXY.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

struct InvocationExposure;

impl Drop for InvocationExposure {
    fn drop(&mut self) {
        CURRENT_INVOCATION.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

static EXPOSE_INVOCATION_ADVISOR: Lazy<Arc<Advisor>> = Lazy::new(|| {
    Arc::new(
        Advisor::always(
            ExposeInvocationInterceptor::ADVISOR_NAME,
            Advice::around(ExposeInvocationInterceptor),
        )
        .with_order(HIGHEST_PRECEDENCE),
    )
});

/// 暴露当前调用的环绕通知
///
/// 它的顾问总是排在链的第 0 位，之后的通知和目标都可以通过
/// `current_invocation()` 取得当前连接点。
pub struct ExposeInvocationInterceptor;

impl ExposeInvocationInterceptor {
    pub const ADVISOR_NAME: &'static str = "exposeInvocation";

    /// 共享的顾问实例
    pub fn advisor() -> Arc<Advisor> {
        Arc::clone(&EXPOSE_INVOCATION_ADVISOR)
    }

    pub fn is_expose_invocation(advisor: &Advisor) -> bool {
        advisor
            .advice()
            .same_instance(EXPOSE_INVOCATION_ADVISOR.advice())
    }

    /// 当前线程正在执行的调用的连接点快照
    pub fn current_invocation() -> AopResult<JoinPoint> {
        CURRENT_INVOCATION
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(AopConfigError::NoCurrentInvocation)
    }
}

impl AroundAdvice for ExposeInvocationInterceptor {
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value> {
        let join_point = invocation.join_point();
        CURRENT_INVOCATION.with(|stack| stack.borrow_mut().push(join_point));
        let _exposure = InvocationExposure;
        invocation.proceed()
    }
}
