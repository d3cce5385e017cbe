//! `chimera.aop.*` 配置
//!
//! ```toml
//! [chimera.aop]
//! enabled = true
//! proxy-target-class = false
//! expose-proxy = true
//! include-patterns = ["^Tx.*"]
//! bean-names = ["*Service"]
//! interceptor-names = ["tracing"]
//! ```

use crate::auto_proxy::{AdvisorAutoProxyCreator, AutoProxySupport, BeanNameAutoProxyCreator, BeanNameMatch, EligibleAdvisors};
use crate::error::AopResult;
use crate::proxy_config::ProxyConfig;
use crate::registry::AdvisorRegistry;
use chimera_core::config::Environment;
use std::sync::Arc;

pub const PREFIX: &str = "chimera.aop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AopProperties {
    pub enabled: bool,

    pub proxy_config: ProxyConfig,

    /// 在每条链首加入暴露当前调用的顾问
    pub expose_invocation: bool,

    /// 只使用名称匹配的切面（正则）
    pub include_patterns: Vec<String>,

    /// 只使用名称以此开头的顾问
    pub advisor_prefix: Option<String>,

    /// 按名称代理的 Bean（为空时不创建按名称的自动代理器）
    pub bean_names: Vec<String>,

    pub interceptor_names: Vec<String>,

    pub apply_common_interceptors_first: bool,

    pub order: i32,
}

impl Default for AopProperties {
    fn default() -> Self {
        let support = AutoProxySupport::default();
        Self {
            enabled: true,
            proxy_config: ProxyConfig::default(),
            expose_invocation: false,
            include_patterns: Vec::new(),
            advisor_prefix: None,
            bean_names: Vec::new(),
            interceptor_names: Vec::new(),
            apply_common_interceptors_first: support.apply_common_interceptors_first,
            order: support.order,
        }
    }
}

fn key(name: &str) -> String {
    format!("{}.{}", PREFIX, name)
}

impl AopProperties {
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();

        let proxy_config = ProxyConfig::new()
            .proxy_target_class(env.get_bool_or(&key("proxy-target-class"), false))
            .optimize(env.get_bool_or(&key("optimize"), false))
            .expose_proxy(env.get_bool_or(&key("expose-proxy"), false))
            .frozen(env.get_bool_or(&key("frozen"), false))
            .opaque(env.get_bool_or(&key("opaque"), false));

        let order = env
            .get_i64(&key("order"))
            .and_then(|o| i32::try_from(o).ok())
            .unwrap_or(defaults.order);

        Self {
            enabled: env.get_bool_or(&key("enabled"), defaults.enabled),
            proxy_config,
            expose_invocation: env.get_bool_or(&key("expose-invocation"), defaults.expose_invocation),
            include_patterns: env.get_string_array(&key("include-patterns")).unwrap_or_default(),
            advisor_prefix: env.get_string(&key("advisor-prefix")).filter(|p| !p.is_empty()),
            bean_names: env.get_string_array(&key("bean-names")).unwrap_or_default(),
            interceptor_names: env.get_string_array(&key("interceptor-names")).unwrap_or_default(),
            apply_common_interceptors_first: env.get_bool_or(
                &key("apply-common-interceptors-first"),
                defaults.apply_common_interceptors_first,
            ),
            order,
        }
    }

    fn support(&self) -> AutoProxySupport {
        AutoProxySupport {
            config: self.proxy_config,
            order: self.order,
            interceptor_names: self.interceptor_names.clone(),
            apply_common_interceptors_first: self.apply_common_interceptors_first,
            target_source_creators: Vec::new(),
        }
    }

    /// 按配置构建切点驱动的自动代理器（正则非法时报错）
    pub fn advisor_auto_proxy_creator(&self, registry: Arc<dyn AdvisorRegistry>) -> AopResult<AdvisorAutoProxyCreator> {
        let mut selection = EligibleAdvisors::new()
            .with_include_patterns(&self.include_patterns)?
            .with_expose_invocation(self.expose_invocation);
        if let Some(prefix) = &self.advisor_prefix {
            selection = selection.with_prefix(prefix.clone());
        }
        Ok(AdvisorAutoProxyCreator::for_advisors(registry)
            .with_support(self.support())
            .with_selection(selection))
    }

    /// 配置了 `bean-names` 时构建按名称的自动代理器，排在切点驱动的之后
    pub fn bean_name_auto_proxy_creator(&self, registry: Arc<dyn AdvisorRegistry>) -> Option<BeanNameAutoProxyCreator> {
        if self.bean_names.is_empty() {
            return None;
        }
        let names = BeanNameMatch::new(self.bean_names.iter().cloned());
        Some(
            BeanNameAutoProxyCreator::for_bean_names(registry, names)
                .with_support(self.support())
                .with_order(self.order.saturating_add(1)),
        )
    }
}
