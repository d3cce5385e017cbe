//! AOP Plugin - 把自动代理注册到 Bean 工厂
//!
//! 读取 `chimera.aop.*` 配置，创建基于 Bean 工厂的顾问注册表，
//! 并注册自动代理创建器（后置处理器）。

use crate::error::AopResult;
use crate::properties::AopProperties;
use crate::registry::{AdvisorRegistry, BeanFactoryAdvisorRegistry};
use chimera_core::bean_factory::DefaultListableBeanFactory;
use chimera_core::config::Environment;
use std::sync::Arc;

/// AOP 插件
///
/// ```ignore
/// let factory = Arc::new(DefaultListableBeanFactory::new());
/// AopPlugin::new().configure(&factory, &environment)?;
/// factory.preinstantiate_singletons()?;
/// ```
pub struct AopPlugin {
    name: String,
    enabled: bool,
    include_static_aspects: bool,
}

impl AopPlugin {
    pub fn new() -> Self {
        Self {
            name: "AopPlugin".to_string(),
            enabled: true,
            include_static_aspects: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 不收集通过 inventory 静态注册的切面
    pub fn without_static_aspects(mut self) -> Self {
        self.include_static_aspects = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 注册自动代理创建器，返回注册的数量
    pub fn configure(&self, factory: &Arc<DefaultListableBeanFactory>, env: &Environment) -> AopResult<usize> {
        let properties = AopProperties::from_environment(env);
        if !self.enabled || !properties.enabled {
            tracing::info!("[{}] AOP is disabled, skipping initialization", self.name);
            return Ok(0);
        }

        tracing::info!("[{}] Initializing AOP support...", self.name);

        let mut registry = BeanFactoryAdvisorRegistry::new(factory);
        if self.include_static_aspects {
            registry = registry.with_static_aspects();
        }
        let registry: Arc<dyn AdvisorRegistry> = Arc::new(registry);

        let mut registered = 0;
        let creator = properties.advisor_auto_proxy_creator(Arc::clone(&registry))?;
        factory.add_bean_post_processor(Arc::new(creator));
        registered += 1;

        if let Some(creator) = properties.bean_name_auto_proxy_creator(registry) {
            factory.add_bean_post_processor(Arc::new(creator));
            registered += 1;
        }

        tracing::info!(
            "[{}] Registered {} auto-proxy creator(s) ({})",
            self.name,
            registered,
            properties.proxy_config
        );
        Ok(registered)
    }
}

impl Default for AopPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::config::MapPropertySource;

    #[test]
    fn test_plugin_creation() {
        let plugin = AopPlugin::new().with_name("CustomAopPlugin");
        assert_eq!(plugin.name(), "CustomAopPlugin");
        assert!(plugin.is_enabled());
        assert!(!AopPlugin::disabled().is_enabled());
    }

    #[test]
    fn test_configure_registers_creators() {
        let factory = Arc::new(DefaultListableBeanFactory::new());
        let env = Environment::new().with_source(
            MapPropertySource::new("test").with_property("chimera.aop.bean-names", "*Service"),
        );

        let registered = AopPlugin::new().configure(&factory, &env).unwrap();
        assert_eq!(registered, 2);

        let names: Vec<String> = factory
            .bean_post_processors()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["AdvisorAutoProxyCreator", "BeanNameAutoProxyCreator"]);
    }

    #[test]
    fn test_disabled_by_property() {
        let factory = Arc::new(DefaultListableBeanFactory::new());
        let env = Environment::new()
            .with_source(MapPropertySource::new("test").with_property("chimera.aop.enabled", false));

        assert_eq!(AopPlugin::new().configure(&factory, &env).unwrap(), 0);
        assert!(factory.bean_post_processors().is_empty());
        assert_eq!(AopPlugin::disabled().configure(&factory, &Environment::new()).unwrap(), 0);
    }
}
