//! AOP 代理
//!
//! `AopProxy` 是运行时动态分发对象：它实现一组接口（按描述符），
//! 每次调用都交给 `InvocationDispatcher` 新建一次调用。
//! 类型化的门面只需要包装 `invoke_by_name` / `call`。

use crate::advised::AdvisedSupport;
use crate::chain::InterceptorChain;
use crate::dispatcher::InvocationDispatcher;
use crate::error::{AopConfigError, AopResult};
use chimera_core::reflect::{Args, InterfaceDescriptor, MethodDescriptor, ReturnType, Value};
use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 由代理自身处理、不进入拦截器链的方法
pub mod meta {
    use super::*;

    pub const OBJECT: &str = "Object";
    pub const ADVISED: &str = "Advised";

    pub(super) static OBJECT_INTERFACE: Lazy<Arc<InterfaceDescriptor>> = Lazy::new(|| {
        Arc::new(
            InterfaceDescriptor::new(OBJECT)
                .method("equals", |m| m.param("Any").returns(ReturnType::Value("bool".into())))
                .method("hash_code", |m| m.returns(ReturnType::Value("u64".into()))),
        )
    });

    pub(super) static ADVISED_INTERFACE: Lazy<Arc<InterfaceDescriptor>> = Lazy::new(|| {
        let value = |name: &str| ReturnType::Value(name.to_string());
        Arc::new(
            InterfaceDescriptor::new(ADVISED)
                .method("advisors", |m| m.returns(value("Vec<Arc<Advisor>>")))
                .method("proxied_interfaces", |m| m.returns(value("Vec<String>")))
                .method("is_interface_proxied", |m| m.param("String").returns(value("bool")))
                .method("target_source", |m| m.returns(value("Arc<dyn TargetSource>")))
                .method("is_frozen", |m| m.returns(value("bool")))
                .method("is_expose_proxy", |m| m.returns(value("bool")))
                .method("add_advisor", |m| m.param("Arc<Advisor>"))
                .method("add_advisor_at", |m| m.param("usize").param("Arc<Advisor>"))
                .method("remove_advisor", |m| m.param("Arc<Advisor>").returns(value("bool")))
                .method("remove_advisor_at", |m| m.param("usize").returns(value("Arc<Advisor>")))
                .method("replace_advisor", |m| {
                    m.param("Arc<Advisor>").param("Arc<Advisor>").returns(value("bool"))
                })
                .method("index_of", |m| m.param("Arc<Advisor>").returns(value("Option<usize>")))
                .method("add_advice", |m| m.param("Advice"))
                .method("count_advice_of_kind", |m| m.param("AdviceType").returns(value("usize")))
                .method("to_proxy_config_string", |m| m.returns(value("String"))),
        )
    });

    /// 代理自身的 equals / hash_code
    pub fn object_interface() -> Arc<InterfaceDescriptor> {
        Arc::clone(&OBJECT_INTERFACE)
    }

    /// 管理接口（不透明代理上不可用）
    pub fn advised_interface() -> Arc<InterfaceDescriptor> {
        Arc::clone(&ADVISED_INTERFACE)
    }
}

pub(crate) enum ProxyStrategy {
    /// 每次调用都从目标来源取目标、从缓存取链
    Dynamic,
    /// 静态目标在构建时取出；冻结时链也预先计算
    Optimized {
        target: Option<Value>,
        fixed_chains: Option<HashMap<MethodDescriptor, Arc<InterceptorChain>>>,
    },
}

pub struct AopProxy {
    advised: Arc<AdvisedSupport>,
    pub(crate) strategy: ProxyStrategy,
}

impl AopProxy {
    pub(crate) fn new(advised: Arc<AdvisedSupport>, strategy: ProxyStrategy) -> Self {
        Self { advised, strategy }
    }

    /// 调用方法
    pub fn invoke(self: &Arc<Self>, method: &MethodDescriptor, args: Args) -> anyhow::Result<Value> {
        InvocationDispatcher::invoke(self, method, args)
    }

    /// 按方法名调用（先查找业务接口，再查找代理自身的方法）
    pub fn invoke_by_name(self: &Arc<Self>, name: &str, args: Args) -> anyhow::Result<Value> {
        let method = self.find_method(name).ok_or_else(|| AopConfigError::NoSuchMethod {
            method: name.to_string(),
        })?;
        self.invoke(&method, args)
    }

    /// 按方法名调用并把结果转为具体类型
    pub fn call<R: Any + Send + Sync>(self: &Arc<Self>, name: &str, args: Args) -> anyhow::Result<Arc<R>> {
        let result = self.invoke_by_name(name, args)?;
        Ok(chimera_core::reflect::downcast::<R>(&result)?)
    }

    pub fn find_method(&self, name: &str) -> Option<MethodDescriptor> {
        self.advised
            .find_method(name)
            .or_else(|| meta::OBJECT_INTERFACE.find_method(name))
            .or_else(|| meta::ADVISED_INTERFACE.find_method(name))
            .cloned()
    }

    /// 管理接口
    pub fn advised(&self) -> AopResult<&Arc<AdvisedSupport>> {
        if self.advised.is_opaque() {
            return Err(AopConfigError::OpaqueProxy {
                method: "advised".to_string(),
            });
        }
        Ok(&self.advised)
    }

    pub(crate) fn advised_unchecked(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 代理实现的全部接口名（非不透明代理包含管理接口）
    pub fn interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .advised
            .proxied_interfaces()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        if !self.advised.is_opaque() {
            names.push(meta::ADVISED.to_string());
        }
        names
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.advised.is_interface_proxied(interface)
            || (interface == meta::ADVISED && !self.advised.is_opaque())
    }

    pub fn target_class_name(&self) -> &str {
        self.advised.target_class().name()
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self.strategy, ProxyStrategy::Optimized { .. })
    }

    /// 作为动态值传递
    pub fn as_value(self: &Arc<Self>) -> Value {
        Arc::clone(self) as Value
    }

    pub fn from_value(value: &Value) -> Option<Arc<AopProxy>> {
        Arc::clone(value).downcast::<AopProxy>().ok()
    }

    pub fn is_aop_proxy(value: &Value) -> bool {
        value.is::<AopProxy>()
    }

    pub(crate) fn hash_code(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for AopProxy {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || *self.advised == *other.advised
    }
}

impl Eq for AopProxy {}

impl Hash for AopProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.advised.hash(state);
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("target_class", &self.advised.target_class().name())
            .field("interfaces", &self.interface_names())
            .field("advisors", &self.advised.advisor_count())
            .field("optimized", &self.is_optimized())
            .finish()
    }
}
