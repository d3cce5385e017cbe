use crate::reflect::{ClassDescriptor, Value};
use std::fmt;
use std::sync::Arc;

/// 容器管理的对象
pub type Bean = Value;

/// 创建 Bean 实例的函数
pub type InstanceFactory = Arc<dyn Fn() -> anyhow::Result<Bean> + Send + Sync>;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// 容器中只有一个实例
    #[default]
    Singleton,

    /// 每次请求都创建新实例
    Prototype,
}

/// Bean 定义 - 描述如何创建 Bean 以及它的类型元数据
#[derive(Clone)]
pub struct BeanDefinition {
    pub name: String,

    pub scope: Scope,

    /// 实例的类型描述，代理创建时据此得到接口列表和反射调用器
    pub class: Arc<ClassDescriptor>,

    pub factory: InstanceFactory,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy: bool,
}

impl BeanDefinition {
    pub fn new<F>(name: impl Into<String>, class: Arc<ClassDescriptor>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Bean> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: Scope::default(),
            class,
            factory: Arc::new(factory),
            lazy: false,
        }
    }

    /// 用已有实例构造单例定义
    pub fn of_instance(name: impl Into<String>, class: Arc<ClassDescriptor>, instance: Bean) -> Self {
        Self::new(name, class, move || Ok(Arc::clone(&instance)))
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("class", &self.class.name())
            .field("lazy", &self.lazy)
            .finish()
    }
}
