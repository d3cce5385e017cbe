//! 代理配置（顾问列表、目标来源、暴露的接口）及其管理接口
//!
//! 每次修改顾问列表都会换一个新的链解析器，旧的缓存随之失效；
//! 正在进行的调用继续使用它开始时看到的快照。

use crate::advice::{Advice, AdviceType};
use crate::advisor::Advisor;
use crate::chain::{InterceptorChain, InterceptorChainResolver};
use crate::error::{AopConfigError, AopResult};
use crate::proxy_config::ProxyConfig;
use crate::target_source::TargetSource;
use chimera_core::reflect::{ClassDescriptor, InterfaceDescriptor, MethodDescriptor};
use parking_lot::RwLock;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
struct AdvisorState {
    advisors: Arc<[Arc<Advisor>]>,
    resolver: Arc<InterceptorChainResolver>,
}

impl AdvisorState {
    fn new(advisors: Vec<Arc<Advisor>>) -> Self {
        Self {
            advisors: advisors.into(),
            resolver: Arc::new(InterceptorChainResolver::new()),
        }
    }
}

pub struct AdvisedSupport {
    config: ProxyConfig,
    target_source: Arc<dyn TargetSource>,
    target_class: Arc<ClassDescriptor>,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
    state: RwLock<AdvisorState>,
}

impl AdvisedSupport {
    pub fn new(
        config: ProxyConfig,
        target_source: Arc<dyn TargetSource>,
        interfaces: Vec<Arc<InterfaceDescriptor>>,
        advisors: Vec<Arc<Advisor>>,
    ) -> Self {
        Self {
            config,
            target_class: target_source.target_class(),
            target_source,
            interfaces,
            state: RwLock::new(AdvisorState::new(advisors)),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    pub fn target_class(&self) -> &Arc<ClassDescriptor> {
        &self.target_class
    }

    pub fn proxied_interfaces(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.interfaces
    }

    pub fn is_interface_proxied(&self, name: &str) -> bool {
        self.interfaces.iter().any(|i| i.name() == name)
    }

    /// 在暴露的接口上按名称查找方法
    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.interfaces.iter().find_map(|i| i.find_method(name))
    }

    pub fn is_frozen(&self) -> bool {
        self.config.frozen
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.config.expose_proxy
    }

    pub fn is_opaque(&self) -> bool {
        self.config.opaque
    }

    /// 当前顾问列表快照
    pub fn advisors(&self) -> Arc<[Arc<Advisor>]> {
        Arc::clone(&self.state.read().advisors)
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    /// 解析（并缓存）某个方法的拦截器链
    pub fn chain_for(&self, method: &MethodDescriptor) -> AopResult<Arc<InterceptorChain>> {
        let state = self.state.read().clone();
        state.resolver.resolve(&self.target_class, method, &state.advisors)
    }

    /// 预先解析所有暴露方法的链，排序冲突在这里报告
    pub(crate) fn warm_chains(&self) -> AopResult<()> {
        let state = self.state.read().clone();
        self.warm(&state)
    }

    fn warm(&self, state: &AdvisorState) -> AopResult<()> {
        for method in self.interfaces.iter().flat_map(|i| i.methods()) {
            state.resolver.resolve(&self.target_class, method, &state.advisors)?;
        }
        Ok(())
    }

    /// 解析所有暴露方法的链，不写缓存
    pub(crate) fn compute_all_chains(
        &self,
    ) -> AopResult<Vec<(MethodDescriptor, Arc<InterceptorChain>)>> {
        let state = self.state.read().clone();
        self.interfaces
            .iter()
            .flat_map(|i| i.methods())
            .map(|m| {
                let chain = state.resolver.compute(&self.target_class, m, &state.advisors)?;
                Ok((m.clone(), Arc::new(chain)))
            })
            .collect()
    }

    pub fn add_advisor(&self, advisor: Arc<Advisor>) -> AopResult<()> {
        self.mutate("add advisor", |advisors| {
            advisors.push(advisor);
            Ok(())
        })
    }

    pub fn add_advisor_at(&self, position: usize, advisor: Arc<Advisor>) -> AopResult<()> {
        self.mutate("add advisor", |advisors| {
            if position > advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfBounds {
                    index: position,
                    len: advisors.len(),
                });
            }
            advisors.insert(position, advisor);
            Ok(())
        })
    }

    /// 移除顾问，不存在时返回 false
    pub fn remove_advisor(&self, advisor: &Advisor) -> AopResult<bool> {
        self.mutate("remove advisor", |advisors| {
            match advisors.iter().position(|a| **a == *advisor) {
                Some(index) => {
                    advisors.remove(index);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn remove_advisor_at(&self, index: usize) -> AopResult<Arc<Advisor>> {
        self.mutate("remove advisor", |advisors| {
            if index >= advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfBounds {
                    index,
                    len: advisors.len(),
                });
            }
            Ok(advisors.remove(index))
        })
    }

    /// 替换顾问，`old` 不存在时返回 false
    pub fn replace_advisor(&self, old: &Advisor, new: Arc<Advisor>) -> AopResult<bool> {
        self.mutate("replace advisor", |advisors| {
            match advisors.iter().position(|a| **a == *old) {
                Some(index) => {
                    advisors[index] = new;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        self.state.read().advisors.iter().position(|a| **a == *advisor)
    }

    /// 用匹配所有方法的顾问包装通知后追加
    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        let name = format!("{}#{}", advice.advice_type(), self.advisor_count());
        self.add_advisor(Arc::new(Advisor::always(name, advice)))
    }

    pub fn count_advice_of_kind(&self, kind: AdviceType) -> usize {
        self.state
            .read()
            .advisors
            .iter()
            .filter(|a| a.advice_type() == kind)
            .count()
    }

    pub fn to_proxy_config_string(&self) -> String {
        let advisors = self.advisors();
        format!(
            "{}; {} interfaces [{}]; {} advisors [{}]; targetSource [{}]",
            self.config,
            self.interfaces.len(),
            self.interfaces
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join(", "),
            advisors.len(),
            advisors
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.target_source.describe()
        )
    }

    fn mutate<R>(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut Vec<Arc<Advisor>>) -> AopResult<R>,
    ) -> AopResult<R> {
        if self.config.frozen {
            tracing::warn!("Rejected '{}' on frozen proxy configuration", operation);
            return Err(AopConfigError::ConfigFrozen { operation });
        }

        let mut state = self.state.write();
        let mut advisors = state.advisors.to_vec();
        let result = change(&mut advisors)?;

        let candidate = AdvisorState::new(advisors);
        self.warm(&candidate)?;
        *state = candidate;

        tracing::debug!(
            "Advice changed ({}), {} advisors, chain cache invalidated",
            operation,
            state.advisors.len()
        );
        Ok(result)
    }

    fn interface_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.interfaces.iter().map(|i| i.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl PartialEq for AdvisedSupport {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        let mine = self.advisors();
        let theirs = other.advisors();
        mine.len() == theirs.len()
            && mine.iter().zip(theirs.iter()).all(|(a, b)| a == b)
            && self.target_source.same_source(other.target_source.as_ref())
            && self.interface_names() == other.interface_names()
    }
}

impl Hash for AdvisedSupport {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.interface_names().hash(state);
        for advisor in self.advisors().iter() {
            advisor.name().hash(state);
        }
    }
}

impl std::fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_proxy_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_source::EmptyTargetSource;

    fn iface() -> Arc<InterfaceDescriptor> {
        Arc::new(InterfaceDescriptor::new("Clock").method("now", |m| m))
    }

    fn support(config: ProxyConfig) -> AdvisedSupport {
        AdvisedSupport::new(
            config,
            Arc::new(EmptyTargetSource::new()),
            vec![iface()],
            Vec::new(),
        )
    }

    fn advisor(name: &str) -> Arc<Advisor> {
        Arc::new(Advisor::always(name, Advice::before_fn(|_| Ok(()))))
    }

    #[test]
    fn test_admin_operations() {
        let advised = support(ProxyConfig::new());
        let a = advisor("a");
        let b = advisor("b");
        let c = advisor("c");

        advised.add_advisor(Arc::clone(&a)).unwrap();
        advised.add_advisor_at(0, Arc::clone(&b)).unwrap();
        assert_eq!(advised.index_of(&a), Some(1));
        assert_eq!(advised.index_of(&c), None);

        assert!(advised.replace_advisor(&b, Arc::clone(&c)).unwrap());
        assert!(!advised.remove_advisor(&b).unwrap());
        assert_eq!(advised.remove_advisor_at(0).unwrap().name(), "c");
        assert!(matches!(
            advised.remove_advisor_at(5),
            Err(AopConfigError::AdvisorIndexOutOfBounds { index: 5, len: 1 })
        ));

        advised
            .add_advice(Advice::after_returning_fn(|_, _| Ok(())))
            .unwrap();
        assert_eq!(advised.count_advice_of_kind(AdviceType::AfterReturning), 1);
        assert_eq!(advised.count_advice_of_kind(AdviceType::Before), 1);
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let advised = support(ProxyConfig::new());
        let now = advised.find_method("now").unwrap().clone();

        assert!(advised.chain_for(&now).unwrap().is_empty());
        advised.add_advisor(advisor("late")).unwrap();
        assert_eq!(advised.chain_for(&now).unwrap().names(), vec!["late"]);
    }

    #[test]
    fn test_conflicting_advisor_is_rejected() {
        let advised = support(ProxyConfig::new());
        let around = |name: &str, index| {
            Arc::new(
                Advisor::always(name, Advice::around_fn(|inv| inv.proceed())).in_aspect("Tx", index),
            )
        };
        advised.add_advisor(around("A", 0)).unwrap();
        advised.add_advisor(around("C", 2)).unwrap();

        let b = Arc::new(
            Advisor::always("B", Advice::after_returning_fn(|_, _| Ok(()))).in_aspect("Tx", 1),
        );
        let err = advised.add_advisor(b).unwrap_err();
        assert!(matches!(err, AopConfigError::PrecedenceCircularity { .. }));
        assert_eq!(advised.advisor_count(), 2);
    }

    #[test]
    fn test_frozen_rejects_changes() {
        let advised = support(ProxyConfig::new().frozen(true));
        let err = advised.add_advisor(advisor("x")).unwrap_err();
        assert!(matches!(err, AopConfigError::ConfigFrozen { .. }));
        assert_eq!(advised.advisor_count(), 0);
    }

    #[test]
    fn test_config_string() {
        let advised = support(ProxyConfig::new().expose_proxy(true));
        advised.add_advisor(advisor("trace")).unwrap();
        let description = advised.to_proxy_config_string();

        assert!(description.contains("exposeProxy=true"));
        assert!(description.contains("1 interfaces [Clock]"));
        assert!(description.contains("1 advisors [trace (before)]"));
        assert!(description.contains("EmptyTargetSource"));
    }
}
