//! 切面（Aspect）定义
//!
//! 切面是一组按声明顺序排列的通知声明，构建后声明顺序固定。
//! 切面的显式顺序会应用到它产生的每一个顾问上。

use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::error::{AopConfigError, AopResult};
use crate::joinpoint::MethodInvocation;
use crate::pointcut::{Pointcut, PointcutExpression};
use chimera_core::reflect::Value;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Aspect {
    name: String,
    order: Option<i32>,
    declarations: Vec<Advisor>,
}

impl Aspect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
            declarations: Vec::new(),
        }
    }

    /// 显式顺序（越小优先级越高）
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 按声明顺序追加一个通知
    pub fn advise(
        mut self,
        advice_name: impl Into<String>,
        pointcut: impl Pointcut + 'static,
        advice: Advice,
    ) -> Self {
        let index = self.declarations.len();
        let advisor = Advisor::new(advice_name, pointcut, advice).in_aspect(self.name.clone(), index);
        self.declarations.push(advisor);
        self
    }

    /// 用切点表达式声明通知，表达式在这里解析
    pub fn declare(
        self,
        advice_name: impl Into<String>,
        expression: &str,
        advice: Advice,
    ) -> AopResult<Self> {
        let pointcut = PointcutExpression::parse(expression)?;
        Ok(self.advise(advice_name, pointcut, advice))
    }

    pub fn before<F>(self, advice_name: impl Into<String>, expression: &str, f: F) -> AopResult<Self>
    where
        F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.declare(advice_name, expression, Advice::before_fn(f))
    }

    pub fn after<F>(self, advice_name: impl Into<String>, expression: &str, f: F) -> AopResult<Self>
    where
        F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.declare(advice_name, expression, Advice::after_fn(f))
    }

    pub fn after_returning<F>(self, advice_name: impl Into<String>, expression: &str, f: F) -> AopResult<Self>
    where
        F: Fn(&MethodInvocation<'_>, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.declare(advice_name, expression, Advice::after_returning_fn(f))
    }

    pub fn after_throwing<F>(self, advice_name: impl Into<String>, expression: &str, f: F) -> AopResult<Self>
    where
        F: Fn(&MethodInvocation<'_>, &anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.declare(advice_name, expression, Advice::after_throwing_fn(f))
    }

    pub fn around<F>(self, advice_name: impl Into<String>, expression: &str, f: F) -> AopResult<Self>
    where
        F: Fn(&mut MethodInvocation<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.declare(advice_name, expression, Advice::around_fn(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn explicit_order(&self) -> Option<i32> {
        self.order
    }

    /// 按声明顺序产生顾问
    pub fn advisors(&self) -> Vec<Advisor> {
        self.declarations
            .iter()
            .map(|advisor| match self.order {
                Some(order) => advisor.clone().with_order(order),
                None => advisor.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("name", &self.name)
            .field("order", &self.order)
            .field(
                "advice",
                &self.declarations.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 切面注册器
///
/// 用 inventory 在编译期提交，运行时由 `StaticAspectSource` 统一收集
pub struct AspectRegistration {
    pub name: &'static str,

    pub creator: fn() -> AopResult<Aspect>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, creator: fn() -> AopResult<Aspect>) -> Self {
        Self { name, creator }
    }
}

inventory::collect!(AspectRegistration);

type BuiltAspect = Result<Arc<Aspect>, String>;

/// 按名称排序，每个注册项只构建一次
static STATIC_ASPECTS: Lazy<Vec<(&'static str, BuiltAspect)>> = Lazy::new(|| {
    let mut registrations: Vec<&'static AspectRegistration> =
        inventory::iter::<AspectRegistration>().collect();
    registrations.sort_by_key(|r| r.name);

    registrations
        .into_iter()
        .map(|r| {
            tracing::debug!("Loading statically registered aspect '{}'", r.name);
            let built = (r.creator)().map(Arc::new).map_err(|e| e.to_string());
            (r.name, built)
        })
        .collect()
});

/// 通过 inventory 静态注册的切面
pub struct StaticAspectSource;

impl StaticAspectSource {
    /// 所有静态切面，任一切面构建失败时返回错误
    pub fn aspects() -> AopResult<Vec<Arc<Aspect>>> {
        STATIC_ASPECTS
            .iter()
            .map(|(name, built)| match built {
                Ok(aspect) => Ok(Arc::clone(aspect)),
                Err(message) => Err(AopConfigError::StaticAspect {
                    name: name.to_string(),
                    message: message.clone(),
                }),
            })
            .collect()
    }

    pub fn advisors() -> AopResult<Vec<Advisor>> {
        Ok(Self::aspects()?
            .iter()
            .flat_map(|aspect| aspect.advisors())
            .collect())
    }

    pub fn names() -> Vec<&'static str> {
        STATIC_ASPECTS.iter().map(|(name, _)| *name).collect()
    }
}
