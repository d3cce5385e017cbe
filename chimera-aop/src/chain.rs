//! 拦截器链解析与缓存
//!
//! 对每个（目标类型，方法）只做一次过滤和排序，结果发布后不可变。
//! 并发解析同一个键时先发布者胜出，所有线程看到同一条链。

use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::pointcut::PointcutMatcher;
use crate::precedence::PrecedenceSorter;
use chimera_core::reflect::{ClassDescriptor, MethodDescriptor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// 某个方法上的有序顾问序列
#[derive(Debug, Clone)]
pub enum InterceptorChain {
    /// 没有适用的顾问，调用直接落到目标上
    Empty,
    Advised(Arc<[Arc<Advisor>]>),
}

impl InterceptorChain {
    pub fn from_advisors(advisors: Vec<Arc<Advisor>>) -> Self {
        if advisors.is_empty() {
            InterceptorChain::Empty
        } else {
            InterceptorChain::Advised(advisors.into())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, InterceptorChain::Empty)
    }

    pub fn advisors(&self) -> &[Arc<Advisor>] {
        match self {
            InterceptorChain::Empty => &[],
            InterceptorChain::Advised(advisors) => advisors,
        }
    }

    pub fn len(&self) -> usize {
        self.advisors().len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.advisors().iter().map(|a| a.name()).collect()
    }
}

/// 类型名 -> 方法 -> 链
type ChainCache = HashMap<String, HashMap<MethodDescriptor, Arc<InterceptorChain>>>;

pub struct InterceptorChainResolver {
    sorter: PrecedenceSorter,
    cache: RwLock<ChainCache>,
}

impl Default for InterceptorChainResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorChainResolver {
    pub fn new() -> Self {
        Self::with_sorter(PrecedenceSorter::default())
    }

    pub fn with_sorter(sorter: PrecedenceSorter) -> Self {
        Self {
            sorter,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 解析并缓存
    pub fn resolve(
        &self,
        class: &ClassDescriptor,
        method: &MethodDescriptor,
        candidates: &[Arc<Advisor>],
    ) -> AopResult<Arc<InterceptorChain>> {
        if let Some(chain) = self
            .cache
            .read()
            .get(class.name())
            .and_then(|methods| methods.get(method))
        {
            return Ok(Arc::clone(chain));
        }

        let chain = Arc::new(self.compute(class, method, candidates)?);
        tracing::trace!(
            "Resolved interceptor chain for {}::{}: {:?}",
            class.name(),
            method.name(),
            chain.names()
        );

        let mut cache = self.cache.write();
        let published = cache
            .entry(class.name().to_string())
            .or_default()
            .entry(method.clone())
            .or_insert(chain);
        Ok(Arc::clone(published))
    }

    /// 过滤 + 排序，不读写缓存
    pub fn compute(
        &self,
        class: &ClassDescriptor,
        method: &MethodDescriptor,
        candidates: &[Arc<Advisor>],
    ) -> AopResult<InterceptorChain> {
        let eligible: Vec<Arc<Advisor>> = candidates
            .iter()
            .filter(|advisor| PointcutMatcher::matches(advisor, class, method))
            .cloned()
            .collect();

        if eligible.is_empty() {
            return Ok(InterceptorChain::Empty);
        }

        Ok(InterceptorChain::from_advisors(self.sorter.sort(eligible)?))
    }

    /// 已缓存的链数量
    pub fn cached_chains(&self) -> usize {
        self.cache.read().values().map(HashMap::len).sum()
    }
}
