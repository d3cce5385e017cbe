//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作。通知构建后不可变，可以被多个顾问共享。

use crate::joinpoint::MethodInvocation;
use chimera_core::reflect::Value;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（返回错误时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

impl AdviceType {
    /// After / AfterReturning / AfterThrowing
    pub fn is_after_family(self) -> bool {
        matches!(
            self,
            AdviceType::After | AdviceType::AfterReturning | AdviceType::AfterThrowing
        )
    }

    /// 只有 Before 属于前置族，Around 既不属于前置族也不属于后置族
    pub fn is_before_family(self) -> bool {
        self == AdviceType::Before
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "after-returning",
            AdviceType::AfterThrowing => "after-throwing",
            AdviceType::Around => "around",
        }
    }
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 前置通知：在目标方法执行前调用，返回错误时目标方法不会执行
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, invocation: &MethodInvocation<'_>) -> anyhow::Result<()>;
}

/// 后置通知：无论成功还是失败都会调用
pub trait AfterAdvice: Send + Sync {
    fn after(&self, invocation: &MethodInvocation<'_>) -> anyhow::Result<()>;
}

/// 返回后通知：目标方法成功返回后调用
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, invocation: &MethodInvocation<'_>, result: &Value) -> anyhow::Result<()>;
}

/// 异常通知：目标方法返回错误时调用，原错误随后继续向外传播
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(&self, invocation: &MethodInvocation<'_>, error: &anyhow::Error) -> anyhow::Result<()>;
}

/// 环绕通知：自行决定是否以及何时调用 `proceed()`
pub trait AroundAdvice: Send + Sync {
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value>;
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Around(Arc<dyn AroundAdvice>),
}

impl Advice {
    pub fn before<A: BeforeAdvice + 'static>(advice: A) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after<A: AfterAdvice + 'static>(advice: A) -> Self {
        Advice::After(Arc::new(advice))
    }

    pub fn after_returning<A: AfterReturningAdvice + 'static>(advice: A) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing<A: AfterThrowingAdvice + 'static>(advice: A) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn around<A: AroundAdvice + 'static>(advice: A) -> Self {
        Advice::Around(Arc::new(advice))
    }

    pub fn before_fn<F>(f: F) -> Self
    where
        F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(FnBefore(f)))
    }

    pub fn after_fn<F>(f: F) -> Self
    where
        F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfter(f)))
    }

    pub fn after_returning_fn<F>(f: F) -> Self
    where
        F: Fn(&MethodInvocation<'_>, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(FnAfterReturning(f)))
    }

    pub fn after_throwing_fn<F>(f: F) -> Self
    where
        F: Fn(&MethodInvocation<'_>, &anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(FnAfterThrowing(f)))
    }

    pub fn around_fn<F>(f: F) -> Self
    where
        F: Fn(&mut MethodInvocation<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(FnAround(f)))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Before(_) => AdviceType::Before,
            Advice::After(_) => AdviceType::After,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::Around(_) => AdviceType::Around,
        }
    }

    /// 在调用链的当前位置执行本通知
    ///
    /// 前置、后置类通知隐式调用 `proceed()`，环绕通知自己调用。
    /// 目标或通知返回的错误原样传播。
    pub fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value> {
        match self {
            Advice::Before(advice) => {
                advice.before(invocation)?;
                invocation.proceed()
            }
            Advice::After(advice) => {
                let result = invocation.proceed();
                advice.after(invocation)?;
                result
            }
            Advice::AfterReturning(advice) => {
                let value = invocation.proceed()?;
                advice.after_returning(invocation, &value)?;
                Ok(value)
            }
            Advice::AfterThrowing(advice) => match invocation.proceed() {
                Ok(value) => Ok(value),
                Err(error) => {
                    advice.after_throwing(invocation, &error)?;
                    Err(error)
                }
            },
            Advice::Around(advice) => advice.around(invocation),
        }
    }

    /// 是否是同一个通知实例
    pub fn same_instance(&self, other: &Advice) -> bool {
        match (self, other) {
            (Advice::Before(a), Advice::Before(b)) => same_arc(a, b),
            (Advice::After(a), Advice::After(b)) => same_arc(a, b),
            (Advice::AfterReturning(a), Advice::AfterReturning(b)) => same_arc(a, b),
            (Advice::AfterThrowing(a), Advice::AfterThrowing(b)) => same_arc(a, b),
            (Advice::Around(a), Advice::Around(b)) => same_arc(a, b),
            _ => false,
        }
    }

    /// 实例地址，用于哈希
    pub(crate) fn addr(&self) -> usize {
        match self {
            Advice::Before(a) => Arc::as_ptr(a) as *const () as usize,
            Advice::After(a) => Arc::as_ptr(a) as *const () as usize,
            Advice::AfterReturning(a) => Arc::as_ptr(a) as *const () as usize,
            Advice::AfterThrowing(a) => Arc::as_ptr(a) as *const () as usize,
            Advice::Around(a) => Arc::as_ptr(a) as *const () as usize,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.advice_type())
    }
}

pub(crate) fn same_arc<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

struct FnBefore<F>(F);

impl<F> BeforeAdvice for FnBefore<F>
where
    F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, invocation: &MethodInvocation<'_>) -> anyhow::Result<()> {
        (self.0)(invocation)
    }
}

struct FnAfter<F>(F);

impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&MethodInvocation<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn after(&self, invocation: &MethodInvocation<'_>) -> anyhow::Result<()> {
        (self.0)(invocation)
    }
}

struct FnAfterReturning<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturning<F>
where
    F: Fn(&MethodInvocation<'_>, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(&self, invocation: &MethodInvocation<'_>, result: &Value) -> anyhow::Result<()> {
        (self.0)(invocation, result)
    }
}

struct FnAfterThrowing<F>(F);

impl<F> AfterThrowingAdvice for FnAfterThrowing<F>
where
    F: Fn(&MethodInvocation<'_>, &anyhow::Error) -> anyhow::Result<()> + Send + Sync,
{
    fn after_throwing(&self, invocation: &MethodInvocation<'_>, error: &anyhow::Error) -> anyhow::Result<()> {
        (self.0)(invocation, error)
    }
}

struct FnAround<F>(F);

impl<F> AroundAdvice for FnAround<F>
where
    F: Fn(&mut MethodInvocation<'_>) -> anyhow::Result<Value> + Send + Sync,
{
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Value> {
        (self.0)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advice_families() {
        assert!(AdviceType::After.is_after_family());
        assert!(AdviceType::AfterReturning.is_after_family());
        assert!(AdviceType::AfterThrowing.is_after_family());
        assert!(!AdviceType::Before.is_after_family());
        assert!(!AdviceType::Around.is_after_family());

        assert!(AdviceType::Before.is_before_family());
        assert!(!AdviceType::Around.is_before_family());
    }

    #[test]
    fn test_same_instance() {
        let a = Advice::before_fn(|_| Ok(()));
        let b = a.clone();
        let c = Advice::before_fn(|_| Ok(()));

        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
        assert_eq!(a.advice_type(), AdviceType::Before);
        assert_eq!(format!("{:?}", Advice::around_fn(|inv| inv.proceed())), "Advice(around)");
    }
}
