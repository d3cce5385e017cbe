//! 连接点（JoinPoint）与方法调用（MethodInvocation）
//!
//! `MethodInvocation` 是单次调用的游标：记录当前执行到拦截器链的哪个位置，
//! `proceed()` 执行下一个通知，到达链尾时调用真正的目标方法。
//! 每次调用都新建一个实例，不会在调用或线程之间共享。

use crate::advisor::Advisor;
use crate::proxy::AopProxy;
use chimera_core::reflect::{Args, ClassDescriptor, MethodDescriptor, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 连接点快照
///
/// 拥有所有数据，可以脱离调用栈保存（例如放到调用上下文里）
#[derive(Clone)]
pub struct JoinPoint {
    pub class: Arc<ClassDescriptor>,

    pub method: MethodDescriptor,

    pub args: Args,

    pub target: Option<Value>,

    /// 调用开始时间
    pub timestamp: Instant,
}

impl JoinPoint {
    /// 方法签名，例如 `PaymentServiceImpl::charge`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.class.name(), self.method.name())
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("args", &self.args)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 单次方法调用
pub struct MethodInvocation<'a> {
    proxy: &'a Arc<AopProxy>,
    target: Option<Value>,
    class: &'a Arc<ClassDescriptor>,
    method: &'a MethodDescriptor,
    args: Args,
    chain: &'a [Arc<Advisor>],
    cursor: usize,
    started: Instant,
    attributes: HashMap<String, Value>,
}

impl<'a> MethodInvocation<'a> {
    pub(crate) fn new(
        proxy: &'a Arc<AopProxy>,
        target: Option<Value>,
        class: &'a Arc<ClassDescriptor>,
        method: &'a MethodDescriptor,
        args: Args,
        chain: &'a [Arc<Advisor>],
    ) -> Self {
        Self {
            proxy,
            target,
            class,
            method,
            args,
            chain,
            cursor: 0,
            started: Instant::now(),
            attributes: HashMap::new(),
        }
    }

    /// 执行链上的下一个通知，到达链尾时调用目标方法
    ///
    /// 环绕通知可以多次调用 `proceed()`（例如重试），每次都会重新执行其后的整段链。
    pub fn proceed(&mut self) -> anyhow::Result<Value> {
        let position = self.cursor;
        let chain = self.chain;
        let Some(advisor) = chain.get(position) else {
            return crate::dispatcher::invoke_target(
                self.class,
                self.target.as_ref(),
                self.method,
                &self.args,
            );
        };

        tracing::trace!(
            "Invoking advisor '{}' [{}/{}] for {}",
            advisor.name(),
            position + 1,
            self.chain.len(),
            self.method.name()
        );

        self.cursor = position + 1;
        let result = advisor.advice().invoke(self);
        self.cursor = position;
        result
    }

    /// 调用所经由的代理对象
    pub fn proxy(&self) -> &Arc<AopProxy> {
        self.proxy
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn class(&self) -> &ClassDescriptor {
        self.class
    }

    pub fn method(&self) -> &MethodDescriptor {
        self.method
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// 环绕通知可以在 `proceed()` 之前改写参数
    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    /// 当前位置（已经进入的通知个数）
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn chain(&self) -> &[Arc<Advisor>] {
        self.chain
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 通知之间共享的调用级属性
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// 签名，例如 `PaymentServiceImpl::charge`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.class.name(), self.method.name())
    }

    /// 生成连接点快照
    pub fn join_point(&self) -> JoinPoint {
        JoinPoint {
            class: Arc::clone(self.class),
            method: self.method.clone(),
            args: self.args.clone(),
            target: self.target.clone(),
            timestamp: self.started,
        }
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("signature", &self.signature())
            .field("position", &self.cursor)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}
