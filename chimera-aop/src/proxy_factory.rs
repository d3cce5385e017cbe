//! 代理工厂
//!
//! 所有配置校验都在 `get_proxy()` / `create()` 时完成，
//! 通过校验的代理在调用期不会再产生配置错误（管理接口的修改除外）。

use crate::advice::Advice;
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::error::{AopConfigError, AopResult};
use crate::proxy::{AopProxy, ProxyStrategy};
use crate::proxy_config::ProxyConfig;
use crate::target_source::{EmptyTargetSource, SingletonTargetSource, TargetSource};
use chimera_core::reflect::{ClassDescriptor, InterfaceDescriptor, Value};
use std::sync::Arc;

/// 代理构建器
///
/// ```ignore
/// let proxy = ProxyFactory::new()
///     .target(value(PaymentServiceImpl::new()), class)
///     .advisor(security_advisor)
///     .get_proxy()?;
/// ```
pub struct ProxyFactory {
    config: ProxyConfig,
    target_source: Option<Arc<dyn TargetSource>>,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
    advisors: Vec<Arc<Advisor>>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self {
            config: ProxyConfig::default(),
            target_source: None,
            interfaces: Vec::new(),
            advisors: Vec::new(),
        }
    }

    /// 以单个对象作为静态目标
    pub fn target(self, target: Value, class: Arc<ClassDescriptor>) -> Self {
        self.target_source(Arc::new(SingletonTargetSource::new(target, class)))
    }

    pub fn target_source(mut self, target_source: Arc<dyn TargetSource>) -> Self {
        self.target_source = Some(target_source);
        self
    }

    /// 显式指定要暴露的接口（未指定时使用目标类型的全部接口）
    pub fn interface(mut self, interface: Arc<InterfaceDescriptor>) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn interfaces(mut self, interfaces: impl IntoIterator<Item = Arc<InterfaceDescriptor>>) -> Self {
        self.interfaces.extend(interfaces);
        self
    }

    pub fn advisor(mut self, advisor: Arc<Advisor>) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn advisors(mut self, advisors: impl IntoIterator<Item = Arc<Advisor>>) -> Self {
        self.advisors.extend(advisors);
        self
    }

    /// 用匹配所有方法的顾问包装通知
    pub fn advice(self, advice: Advice) -> Self {
        let name = format!("{}#{}", advice.advice_type(), self.advisors.len());
        self.advisor(Arc::new(Advisor::always(name, advice)))
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn proxy_config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn get_proxy(self) -> AopResult<Arc<AopProxy>> {
        let target_source = self
            .target_source
            .unwrap_or_else(|| Arc::new(EmptyTargetSource::new()));
        Self::create(target_source, self.advisors, self.interfaces, self.config)
    }

    /// 校验配置并创建代理
    pub fn create(
        target_source: Arc<dyn TargetSource>,
        advisors: Vec<Arc<Advisor>>,
        interfaces: Vec<Arc<InterfaceDescriptor>>,
        config: ProxyConfig,
    ) -> AopResult<Arc<AopProxy>> {
        if advisors.is_empty() && target_source.is_empty() {
            tracing::warn!("Rejected proxy with no advisors and no target source");
            return Err(AopConfigError::NoAdvisorsAndNoTarget);
        }

        if config.optimize {
            if !target_source.is_static() {
                tracing::warn!(
                    "Rejected optimized proxy over dynamic target source: {}",
                    target_source.describe()
                );
                return Err(AopConfigError::StaticTargetRequired {
                    target_source: target_source.describe(),
                });
            }
            if config.expose_proxy {
                tracing::warn!("Rejected optimized proxy with expose_proxy enabled");
                return Err(AopConfigError::ExposeProxyNotSupported);
            }
        }

        let class = target_source.target_class();
        let interfaces = Self::resolve_interfaces(&class, interfaces, &config);
        if interfaces.is_empty() {
            tracing::warn!("Rejected proxy for '{}': no interfaces to proxy", class.name());
            return Err(AopConfigError::NoProxiedInterfaces {
                class: class.name().to_string(),
            });
        }

        let advised = Arc::new(AdvisedSupport::new(config, target_source, interfaces, advisors));
        advised.warm_chains()?;

        let strategy = if config.optimize {
            let target = advised.target_source().get_target().map_err(|e| {
                AopConfigError::TargetUnavailable {
                    target_source: advised.target_source().describe(),
                    message: format!("{:#}", e),
                }
            })?;
            let fixed_chains = if config.frozen {
                Some(advised.compute_all_chains()?.into_iter().collect())
            } else {
                None
            };
            ProxyStrategy::Optimized {
                target,
                fixed_chains,
            }
        } else {
            ProxyStrategy::Dynamic
        };

        let proxy = Arc::new(AopProxy::new(Arc::clone(&advised), strategy));
        tracing::debug!(
            "Created AOP proxy for '{}' ({}): {}",
            advised.target_class().name(),
            if proxy.is_optimized() { "optimized" } else { "dynamic" },
            advised.to_proxy_config_string()
        );
        Ok(proxy)
    }

    fn resolve_interfaces(
        class: &ClassDescriptor,
        explicit: Vec<Arc<InterfaceDescriptor>>,
        config: &ProxyConfig,
    ) -> Vec<Arc<InterfaceDescriptor>> {
        let mut interfaces = explicit;
        if config.proxy_target_class || interfaces.is_empty() {
            for interface in class.interfaces() {
                if !interfaces.iter().any(|i| i.name() == interface.name()) {
                    interfaces.push(Arc::clone(interface));
                }
            }
        }
        interfaces
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_source::{HotSwappableTargetSource, PrototypeTargetSource};
    use chimera_core::reflect::{value, Args, ReflectiveInvoker};

    struct Greeter;

    fn greeter_interface() -> Arc<InterfaceDescriptor> {
        Arc::new(InterfaceDescriptor::new("Greeter").method("greet", |m| m))
    }

    fn greeter_class() -> Arc<ClassDescriptor> {
        Arc::new(
            ClassDescriptor::of::<Greeter>()
                .implements(greeter_interface())
                .invoker(ReflectiveInvoker::<Greeter>::new().method("greet", |_, _| Ok(value("hi")))),
        )
    }

    #[test]
    fn test_no_advisors_and_no_target() {
        let err = ProxyFactory::new()
            .interface(greeter_interface())
            .get_proxy()
            .unwrap_err();
        assert!(matches!(err, AopConfigError::NoAdvisorsAndNoTarget));
    }

    #[test]
    fn test_interfaces_default_to_target_class() {
        let proxy = ProxyFactory::new()
            .target(value(Greeter), greeter_class())
            .get_proxy()
            .unwrap();
        assert!(proxy.implements("Greeter"));
        assert!(proxy.implements("Advised"));
    }

    #[test]
    fn test_no_interfaces() {
        let err = ProxyFactory::new()
            .target(value(Greeter), Arc::new(ClassDescriptor::of::<Greeter>()))
            .get_proxy()
            .unwrap_err();
        assert!(matches!(err, AopConfigError::NoProxiedInterfaces { .. }));
    }

    #[test]
    fn test_optimized_requires_static_target() {
        let source = Arc::new(PrototypeTargetSource::new("greeter", greeter_class(), || Ok(value(Greeter))));
        let err = ProxyFactory::new()
            .target_source(source)
            .config(ProxyConfig::new().optimize(true))
            .get_proxy()
            .unwrap_err();
        assert!(matches!(err, AopConfigError::StaticTargetRequired { .. }));

        let swappable = Arc::new(HotSwappableTargetSource::new(value(Greeter), greeter_class()));
        let err = ProxyFactory::new()
            .target_source(swappable)
            .config(ProxyConfig::new().optimize(true).frozen(true))
            .get_proxy()
            .unwrap_err();
        assert!(matches!(err, AopConfigError::StaticTargetRequired { .. }));
    }

    #[test]
    fn test_optimized_rejects_expose_proxy() {
        let err = ProxyFactory::new()
            .target(value(Greeter), greeter_class())
            .config(ProxyConfig::new().optimize(true).expose_proxy(true))
            .get_proxy()
            .unwrap_err();
        assert!(matches!(err, AopConfigError::ExposeProxyNotSupported));
    }

    #[test]
    fn test_optimized_frozen_uses_fixed_chains() {
        let proxy = ProxyFactory::new()
            .target(value(Greeter), greeter_class())
            .advice(Advice::before_fn(|_| Ok(())))
            .config(ProxyConfig::new().optimize(true).frozen(true))
            .get_proxy()
            .unwrap();

        assert!(proxy.is_optimized());
        let greeting = proxy.call::<&str>("greet", Args::new()).unwrap();
        assert_eq!(*greeting, "hi");
    }
}
