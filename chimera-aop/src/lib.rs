//! Chimera AOP - 方法拦截运行时
//!
//! 提供类似 Spring AOP 的代理式方法拦截：
//! - 切面与顾问（切点 + 通知），五种通知类型
//! - 切点表达式（`execution(...)`、`within(...)`、`interface(...)` 及组合）
//! - 顾问优先级排序与环路检测，按（类型，方法）缓存的拦截器链
//! - 运行时动态分发的代理（`AopProxy`），空链直接调用目标
//! - 通过 BeanPostProcessor 自动为 Bean 创建代理

pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aspect;
pub mod auto_proxy;
pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod error_info;
pub mod interceptors;
pub mod joinpoint;
pub mod plugin;
pub mod pointcut;
pub mod precedence;
pub mod properties;
pub mod proxy;
pub mod proxy_config;
pub mod proxy_factory;
pub mod registry;
pub mod target_source;

// 重新导出核心类型
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice,
    BeforeAdvice,
};
pub use advised::AdvisedSupport;
pub use advisor::{Advisor, ChainSegment, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
pub use aspect::{Aspect, AspectRegistration, StaticAspectSource};
pub use auto_proxy::{
    AdvisorAutoProxyCreator, AdvisorSelection, AutoProxyCreator, AutoProxySupport,
    BeanNameAutoProxyCreator, BeanNameMatch, EligibleAdvisors, HotSwappableTargetSourceCreator,
    PrototypeTargetSourceCreator, ProxyDecision, TargetSourceCreator,
};
pub use chain::{InterceptorChain, InterceptorChainResolver};
pub use context::{AopContext, ExposeInvocationInterceptor};
pub use dispatcher::InvocationDispatcher;
pub use error::{AopConfigError, AopResult};
pub use error_info::ErrorInfo;
pub use interceptors::{ExceptionLoggingAdvice, PerformanceMonitorInterceptor, TraceInterceptor};
pub use joinpoint::{JoinPoint, MethodInvocation};
pub use plugin::AopPlugin;
pub use pointcut::{NamePattern, ParamsPattern, Pointcut, PointcutExpression, PointcutMatcher};
pub use precedence::{AspectPrecedenceComparator, Precedence, PrecedenceComparator, PrecedenceSorter};
pub use properties::AopProperties;
pub use proxy::AopProxy;
pub use proxy_config::ProxyConfig;
pub use proxy_factory::ProxyFactory;
pub use registry::{AdvisorRegistry, AspectRegistry, BeanFactoryAdvisorRegistry};
pub use target_source::{
    EmptyTargetSource, HotSwappableTargetSource, PrototypeTargetSource, SingletonTargetSource,
    TargetSource,
};

// 导出 inventory 供静态注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, ChainSegment, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::auto_proxy::{AdvisorAutoProxyCreator, BeanNameAutoProxyCreator, BeanNameMatch, EligibleAdvisors};
    pub use crate::context::{AopContext, ExposeInvocationInterceptor};
    pub use crate::error::{AopConfigError, AopResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{JoinPoint, MethodInvocation};
    pub use crate::plugin::AopPlugin;
    pub use crate::pointcut::{Pointcut, PointcutExpression};
    pub use crate::proxy::AopProxy;
    pub use crate::proxy_config::ProxyConfig;
    pub use crate::proxy_factory::ProxyFactory;
    pub use crate::registry::{AdvisorRegistry, AspectRegistry, BeanFactoryAdvisorRegistry};
    pub use crate::target_source::*;
}

/// 静态注册切面
///
/// ```ignore
/// chimera_aop::register_aspect!("Audit", || {
///     Aspect::new("Audit").before("log", "execution(* *Service.*(..))", |_| Ok(()))
/// });
/// ```
#[macro_export]
macro_rules! register_aspect {
    ($name:expr, $creator:expr) => {
        $crate::inventory::submit! {
            $crate::AspectRegistration::new($name, $creator)
        }
    };
}
