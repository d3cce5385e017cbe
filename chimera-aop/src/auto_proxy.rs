//! 自动代理创建器
//!
//! 作为 `BeanPostProcessor` 在 Bean 初始化之后检查它是否需要代理：
//! 有适用的顾问（或需要自定义目标来源）时返回代理，否则原样返回。
//!
//! ```ignore
//! let registry = Arc::new(BeanFactoryAdvisorRegistry::new(&factory));
//! factory.add_bean_post_processor(Arc::new(AdvisorAutoProxyCreator::for_advisors(registry)));
//! ```

use crate::advice::Advice;
use crate::advisor::{Advisor, ChainSegment};
use crate::aspect::Aspect;
use crate::context::ExposeInvocationInterceptor;
use crate::error::{AopConfigError, AopResult};
use crate::pointcut::PointcutMatcher;
use crate::proxy::AopProxy;
use crate::proxy_config::ProxyConfig;
use crate::proxy_factory::ProxyFactory;
use crate::registry::AdvisorRegistry;
use crate::target_source::{HotSwappableTargetSource, PrototypeTargetSource, SingletonTargetSource, TargetSource};
use chimera_core::bean::Bean;
use chimera_core::error::{ContainerError, ContainerResult};
use chimera_core::lifecycle::BeanPostProcessor;
use chimera_core::reflect::ClassDescriptor;
use regex::Regex;
use std::sync::Arc;

/// 自动代理的公共设置
#[derive(Clone)]
pub struct AutoProxySupport {
    pub config: ProxyConfig,

    /// 后置处理器顺序
    pub order: i32,

    /// 公共拦截器的名称（按顺序解析）
    pub interceptor_names: Vec<String>,

    /// 公共拦截器放在特定顾问之前
    pub apply_common_interceptors_first: bool,

    pub target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
}

impl Default for AutoProxySupport {
    fn default() -> Self {
        Self {
            config: ProxyConfig::default(),
            order: 2000,
            interceptor_names: Vec::new(),
            apply_common_interceptors_first: true,
            target_source_creators: Vec::new(),
        }
    }
}

/// 顾问选择的结果
#[derive(Debug, Clone)]
pub enum ProxyDecision {
    DoNotProxy,

    /// 代理，并使用这些特定顾问（可以为空，此时只有公共拦截器）
    ProxyWith(Vec<Arc<Advisor>>),
}

/// 为一个 Bean 选择特定顾问的策略
pub trait AdvisorSelection: Send + Sync {
    fn advisors_for(
        &self,
        class: &ClassDescriptor,
        bean_name: &str,
        registry: &dyn AdvisorRegistry,
    ) -> AopResult<ProxyDecision>;
}

/// 为需要代理的 Bean 提供自定义目标来源
pub trait TargetSourceCreator: Send + Sync {
    fn create(
        &self,
        bean: &Bean,
        class: &Arc<ClassDescriptor>,
        bean_name: &str,
        registry: &Arc<dyn AdvisorRegistry>,
    ) -> AopResult<Option<Arc<dyn TargetSource>>>;
}

pub struct AutoProxyCreator<S> {
    name: String,
    support: AutoProxySupport,
    registry: Arc<dyn AdvisorRegistry>,
    selection: S,
}

/// 根据切点自动代理（候选顾问来自注册表）
pub type AdvisorAutoProxyCreator = AutoProxyCreator<EligibleAdvisors>;

/// 按 Bean 名称代理，只使用公共拦截器
pub type BeanNameAutoProxyCreator = AutoProxyCreator<BeanNameMatch>;

impl AutoProxyCreator<EligibleAdvisors> {
    pub fn for_advisors(registry: Arc<dyn AdvisorRegistry>) -> Self {
        Self::new("AdvisorAutoProxyCreator", registry, EligibleAdvisors::new())
    }
}

impl AutoProxyCreator<BeanNameMatch> {
    pub fn for_bean_names(registry: Arc<dyn AdvisorRegistry>, names: BeanNameMatch) -> Self {
        Self::new("BeanNameAutoProxyCreator", registry, names)
    }
}

impl<S: AdvisorSelection> AutoProxyCreator<S> {
    pub fn new(name: impl Into<String>, registry: Arc<dyn AdvisorRegistry>, selection: S) -> Self {
        Self {
            name: name.into(),
            support: AutoProxySupport::default(),
            registry,
            selection,
        }
    }

    pub fn with_selection(mut self, selection: S) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_support(mut self, support: AutoProxySupport) -> Self {
        self.support = support;
        self
    }

    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.support.config.copy_from(&config);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.support.order = order;
        self
    }

    pub fn with_interceptor_names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.support.interceptor_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn apply_common_interceptors_first(mut self, first: bool) -> Self {
        self.support.apply_common_interceptors_first = first;
        self
    }

    pub fn with_target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.support.target_source_creators.push(creator);
        self
    }

    pub fn support(&self) -> &AutoProxySupport {
        &self.support
    }

    pub fn selection(&self) -> &S {
        &self.selection
    }

    /// 需要时返回代理，否则返回原对象
    pub fn maybe_wrap(&self, bean: Bean, bean_name: &str) -> AopResult<Bean> {
        if Self::is_infrastructure(&bean) {
            tracing::trace!("Bean '{}' is AOP infrastructure, not proxying", bean_name);
            return Ok(bean);
        }

        let Some(class) = self.registry.class_of(&bean, bean_name) else {
            tracing::trace!("No type information for bean '{}', not proxying", bean_name);
            return Ok(bean);
        };
        if class.interfaces().is_empty() {
            tracing::trace!("Bean '{}' implements no interfaces, not proxying", bean_name);
            return Ok(bean);
        }

        let custom_target_source = self.custom_target_source(&bean, &class, bean_name)?;
        let specific = match self
            .selection
            .advisors_for(&class, bean_name, self.registry.as_ref())?
        {
            ProxyDecision::ProxyWith(advisors) => advisors,
            ProxyDecision::DoNotProxy if custom_target_source.is_some() => Vec::new(),
            ProxyDecision::DoNotProxy => {
                tracing::trace!("No advisors apply to bean '{}', not proxying", bean_name);
                return Ok(bean);
            }
        };

        let advisors = self.build_advisors(bean_name, specific)?;
        let target_source: Arc<dyn TargetSource> = match custom_target_source {
            Some(source) => source,
            None => Arc::new(SingletonTargetSource::new(bean, Arc::clone(&class))),
        };

        tracing::info!(
            "Creating AOP proxy for bean '{}' ({}) with {} advisor(s)",
            bean_name,
            class.name(),
            advisors.len()
        );
        let proxy = ProxyFactory::create(target_source, advisors, Vec::new(), self.support.config)?;
        Ok(proxy.as_value())
    }

    fn is_infrastructure(bean: &Bean) -> bool {
        AopProxy::is_aop_proxy(bean) || bean.is::<Advisor>() || bean.is::<Aspect>() || bean.is::<Advice>()
    }

    fn custom_target_source(
        &self,
        bean: &Bean,
        class: &Arc<ClassDescriptor>,
        bean_name: &str,
    ) -> AopResult<Option<Arc<dyn TargetSource>>> {
        for creator in &self.support.target_source_creators {
            if let Some(source) = creator.create(bean, class, bean_name, &self.registry)? {
                tracing::debug!("Using custom target source for bean '{}': {}", bean_name, source.describe());
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    /// 公共拦截器与特定顾问合并
    fn build_advisors(&self, bean_name: &str, specific: Vec<Arc<Advisor>>) -> AopResult<Vec<Arc<Advisor>>> {
        let mut common = Vec::new();
        for name in &self.support.interceptor_names {
            common.extend(self.registry.interceptor(name)?);
        }
        if !common.is_empty() {
            tracing::debug!(
                "Bean '{}' gets {} common interceptor(s) and {} specific advisor(s)",
                bean_name,
                common.len(),
                specific.len()
            );
        }

        let segment = if self.support.apply_common_interceptors_first {
            ChainSegment::Leading
        } else {
            ChainSegment::Trailing
        };
        let common = common
            .into_iter()
            .map(|advisor| Arc::new(advisor.as_ref().clone().in_segment(segment)));

        Ok(if segment == ChainSegment::Leading {
            common.chain(specific).collect()
        } else {
            specific.into_iter().chain(common).collect()
        })
    }
}

impl<S: AdvisorSelection> BeanPostProcessor for AutoProxyCreator<S> {
    fn post_process_after_initialization(&self, bean: Bean, bean_name: &str) -> ContainerResult<Bean> {
        self.maybe_wrap(bean, bean_name)
            .map_err(|e| ContainerError::PostProcessingFailed {
                bean: bean_name.to_string(),
                processor: self.name.clone(),
                message: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.support.order
    }
}

/// 根据切点为 Bean 选出可以应用的候选顾问
#[derive(Debug, Clone, Default)]
pub struct EligibleAdvisors {
    advisor_name_prefix: Option<String>,
    include_patterns: Vec<Regex>,
    expose_invocation: bool,
}

impl EligibleAdvisors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只使用名称以此开头的顾问
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.advisor_name_prefix = Some(prefix.into());
        self
    }

    /// 只使用名称完整匹配任一正则的切面中的顾问（不属于切面的顾问不受影响）
    pub fn with_include_patterns<I, P>(mut self, patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| AopConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            self.include_patterns.push(regex);
        }
        Ok(self)
    }

    /// 在链首加入暴露当前调用的顾问
    pub fn with_expose_invocation(mut self, expose: bool) -> Self {
        self.expose_invocation = expose;
        self
    }

    fn is_candidate(&self, advisor: &Advisor) -> bool {
        if let Some(prefix) = &self.advisor_name_prefix {
            if !advisor.name().starts_with(prefix.as_str()) {
                return false;
            }
        }
        match advisor.aspect_name() {
            Some(aspect) if !self.include_patterns.is_empty() => {
                self.include_patterns.iter().any(|p| p.is_match(aspect))
            }
            _ => true,
        }
    }
}

impl AdvisorSelection for EligibleAdvisors {
    fn advisors_for(
        &self,
        class: &ClassDescriptor,
        bean_name: &str,
        registry: &dyn AdvisorRegistry,
    ) -> AopResult<ProxyDecision> {
        let mut eligible: Vec<Arc<Advisor>> = registry
            .candidate_advisors()?
            .into_iter()
            .filter(|advisor| self.is_candidate(advisor))
            .filter(|advisor| PointcutMatcher::can_apply(advisor, class))
            .collect();

        if eligible.is_empty() {
            return Ok(ProxyDecision::DoNotProxy);
        }

        tracing::trace!(
            "Eligible advisors for bean '{}': {:?}",
            bean_name,
            eligible.iter().map(|a| a.name()).collect::<Vec<_>>()
        );
        if self.expose_invocation {
            eligible.insert(0, ExposeInvocationInterceptor::advisor());
        }
        Ok(ProxyDecision::ProxyWith(eligible))
    }
}

/// Bean 名称匹配：精确名称、`prefix*`、`*suffix` 或 `*`
#[derive(Debug, Clone, Default)]
pub struct BeanNameMatch {
    patterns: Vec<String>,
}

impl BeanNameMatch {
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            patterns: names.into_iter().map(|n| n.into().trim().to_string()).collect(),
        }
    }

    pub fn matches(&self, bean_name: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix('*') {
                bean_name.starts_with(prefix)
            } else if let Some(suffix) = pattern.strip_prefix('*') {
                bean_name.ends_with(suffix)
            } else {
                pattern == bean_name
            }
        })
    }
}

impl AdvisorSelection for BeanNameMatch {
    fn advisors_for(
        &self,
        _class: &ClassDescriptor,
        bean_name: &str,
        _registry: &dyn AdvisorRegistry,
    ) -> AopResult<ProxyDecision> {
        if self.matches(bean_name) {
            Ok(ProxyDecision::ProxyWith(Vec::new()))
        } else {
            Ok(ProxyDecision::DoNotProxy)
        }
    }
}

/// 为名称匹配的 Bean 使用可热替换的目标来源
pub struct HotSwappableTargetSourceCreator {
    names: BeanNameMatch,
}

impl HotSwappableTargetSourceCreator {
    pub fn new(names: BeanNameMatch) -> Self {
        Self { names }
    }
}

impl TargetSourceCreator for HotSwappableTargetSourceCreator {
    fn create(
        &self,
        bean: &Bean,
        class: &Arc<ClassDescriptor>,
        bean_name: &str,
        _registry: &Arc<dyn AdvisorRegistry>,
    ) -> AopResult<Option<Arc<dyn TargetSource>>> {
        if !self.names.matches(bean_name) {
            return Ok(None);
        }
        Ok(Some(Arc::new(HotSwappableTargetSource::new(
            Arc::clone(bean),
            Arc::clone(class),
        ))))
    }
}

/// 为非单例 Bean 使用每次调用创建新目标的来源
pub struct PrototypeTargetSourceCreator {
    names: BeanNameMatch,
}

impl PrototypeTargetSourceCreator {
    pub fn new(names: BeanNameMatch) -> Self {
        Self { names }
    }
}

impl TargetSourceCreator for PrototypeTargetSourceCreator {
    fn create(
        &self,
        _bean: &Bean,
        class: &Arc<ClassDescriptor>,
        bean_name: &str,
        registry: &Arc<dyn AdvisorRegistry>,
    ) -> AopResult<Option<Arc<dyn TargetSource>>> {
        if !self.names.matches(bean_name) || registry.is_singleton(bean_name) {
            return Ok(None);
        }

        let registry = Arc::clone(registry);
        let name = bean_name.to_string();
        Ok(Some(Arc::new(PrototypeTargetSource::new(
            bean_name,
            Arc::clone(class),
            move || Ok(registry.instantiate_raw(&name)?),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bean_name_match() {
        let names = BeanNameMatch::new(["orderService", "payment*", "*Repository"]);
        assert!(names.matches("orderService"));
        assert!(names.matches("paymentGateway"));
        assert!(names.matches("userRepository"));
        assert!(!names.matches("orderServiceImpl"));
        assert!(!names.matches("auditLog"));
        assert!(BeanNameMatch::new(["*"]).matches("anything"));
    }

    #[test]
    fn test_invalid_include_pattern() {
        let err = EligibleAdvisors::new().with_include_patterns(["(unclosed"]).unwrap_err();
        assert!(matches!(err, AopConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_candidate_filtering() {
        let selection = EligibleAdvisors::new()
            .with_prefix("tx")
            .with_include_patterns(["^Tx.*"])
            .unwrap();

        let plain = Advisor::always("txAudit", Advice::before_fn(|_| Ok(())));
        let in_tx = Advisor::always("txBegin", Advice::before_fn(|_| Ok(()))).in_aspect("TxAspect", 0);
        let in_other = Advisor::always("txLog", Advice::before_fn(|_| Ok(()))).in_aspect("Logging", 0);
        let unprefixed = Advisor::always("audit", Advice::before_fn(|_| Ok(())));

        assert!(selection.is_candidate(&plain));
        assert!(selection.is_candidate(&in_tx));
        assert!(!selection.is_candidate(&in_other));
        assert!(!selection.is_candidate(&unprefixed));
    }

    #[test]
    fn test_include_pattern_must_match_whole_aspect_name() {
        let selection = EligibleAdvisors::new().with_include_patterns(["Sec"]).unwrap();
        let check = |aspect: &str| Advisor::always("check", Advice::before_fn(|_| Ok(()))).in_aspect(aspect, 0);

        assert!(selection.is_candidate(&check("Sec")));
        assert!(!selection.is_candidate(&check("Security")));
        assert!(!selection.is_candidate(&check("NotSec")));

        let selection = EligibleAdvisors::new().with_include_patterns(["Sec.*|Audit"]).unwrap();
        assert!(selection.is_candidate(&check("Security")));
        assert!(selection.is_candidate(&check("Audit")));
        assert!(!selection.is_candidate(&check("NotSecurity")));
    }
}
