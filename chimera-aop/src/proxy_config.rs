//! 代理选项

use std::fmt;

/// 代理选项
///
/// 自动代理创建器与它创建的代理工厂共享同一组选项（见 `copy_from`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProxyConfig {
    /// 暴露目标类型实现的全部接口，而不是只暴露显式指定的接口
    pub proxy_target_class: bool,

    /// 优化策略：要求静态目标，并在冻结时预先计算所有方法的拦截器链
    pub optimize: bool,

    /// 调用期间通过 `AopContext::current_proxy()` 暴露当前代理
    pub expose_proxy: bool,

    /// 冻结后不允许再修改顾问
    pub frozen: bool,

    /// 不透明代理不暴露管理接口
    pub opaque: bool,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy_from(&mut self, other: &ProxyConfig) {
        *self = *other;
    }

    pub fn proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    pub fn optimize(mut self, value: bool) -> Self {
        self.optimize = value;
        self
    }

    pub fn expose_proxy(mut self, value: bool) -> Self {
        self.expose_proxy = value;
        self
    }

    pub fn frozen(mut self, value: bool) -> Self {
        self.frozen = value;
        self
    }

    pub fn opaque(mut self, value: bool) -> Self {
        self.opaque = value;
        self
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxyTargetClass={}; optimize={}; opaque={}; exposeProxy={}; frozen={}",
            self.proxy_target_class, self.optimize, self.opaque, self.expose_proxy, self.frozen
        )
    }
}
