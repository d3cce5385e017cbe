//! 目标来源（TargetSource）
//!
//! 静态来源每次返回同一个对象；动态来源每次调用可能返回不同的对象，
//! 调用结束后由分发器调用 `release_target` 归还。

use crate::error::{AopConfigError, AopResult};
use chimera_core::reflect::{same_object, ClassDescriptor, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

pub trait TargetSource: Send + Sync {
    /// 目标的类型描述（决定反射调用器和缓存键）
    fn target_class(&self) -> Arc<ClassDescriptor>;

    /// 是否总是返回同一个对象
    fn is_static(&self) -> bool;

    /// 获取本次调用的目标，`None` 表示没有目标
    fn get_target(&self) -> anyhow::Result<Option<Value>>;

    fn release_target(&self, _target: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_empty(&self) -> bool {
        false
    }

    /// 两个来源是否等价（用于代理相等性）
    fn same_source(&self, other: &dyn TargetSource) -> bool;

    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

/// 持有单个对象的静态来源
pub struct SingletonTargetSource {
    target: Value,
    class: Arc<ClassDescriptor>,
}

impl SingletonTargetSource {
    pub fn new(target: Value, class: Arc<ClassDescriptor>) -> Self {
        Self { target, class }
    }

    pub fn target(&self) -> &Value {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Arc<ClassDescriptor> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Value>> {
        Ok(Some(Arc::clone(&self.target)))
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<SingletonTargetSource>()
            .is_some_and(|o| same_object(&self.target, &o.target))
    }

    fn describe(&self) -> String {
        format!("SingletonTargetSource for target object [{}]", self.class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 没有目标的来源，只能代理接口（所有调用必须由通知处理）
pub struct EmptyTargetSource {
    class: Arc<ClassDescriptor>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self {
            class: Arc::new(ClassDescriptor::named("EmptyTarget")),
        }
    }

    /// 带类型信息的空来源（类型上的接口会被代理）
    pub fn for_class(class: Arc<ClassDescriptor>) -> Self {
        Self { class }
    }
}

impl Default for EmptyTargetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Arc<ClassDescriptor> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<EmptyTargetSource>()
            .is_some_and(|o| *o.class == *self.class)
    }

    fn describe(&self) -> String {
        format!("EmptyTargetSource: target class [{}]", self.class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type TargetFactory = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// 每次调用创建新目标的动态来源
pub struct PrototypeTargetSource {
    name: String,
    class: Arc<ClassDescriptor>,
    factory: TargetFactory,
}

impl PrototypeTargetSource {
    pub fn new<F>(name: impl Into<String>, class: Arc<ClassDescriptor>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            class,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Arc<ClassDescriptor> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Value>> {
        tracing::trace!("Creating new prototype target for '{}'", self.name);
        (self.factory)().map(Some)
    }

    fn release_target(&self, _target: &Value) -> anyhow::Result<()> {
        tracing::trace!("Releasing prototype target for '{}'", self.name);
        Ok(())
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<PrototypeTargetSource>()
            .is_some_and(|o| o.name == self.name && *o.class == *self.class)
    }

    fn describe(&self) -> String {
        format!("PrototypeTargetSource for target bean '{}'", self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 可以在运行时替换目标的动态来源
pub struct HotSwappableTargetSource {
    class: Arc<ClassDescriptor>,
    target: RwLock<Value>,
}

impl HotSwappableTargetSource {
    pub fn new(target: Value, class: Arc<ClassDescriptor>) -> Self {
        Self {
            class,
            target: RwLock::new(target),
        }
    }

    /// 替换目标，返回旧目标
    ///
    /// 新目标必须是同一类型的实例
    pub fn swap(&self, new_target: Value) -> AopResult<Value> {
        if ClassDescriptor::type_id(&self.class).is_some() && !self.class.is_instance(&new_target) {
            return Err(AopConfigError::IncompatibleTarget {
                expected: self.class.name().to_string(),
                actual: "value of another type".to_string(),
            });
        }

        let old = std::mem::replace(&mut *self.target.write(), new_target);
        tracing::debug!("Swapped target of HotSwappableTargetSource [{}]", self.class.name());
        Ok(old)
    }

    pub fn current(&self) -> Value {
        Arc::clone(&self.target.read())
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Arc<ClassDescriptor> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Value>> {
        Ok(Some(self.current()))
    }

    fn same_source(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<HotSwappableTargetSource>()
            .is_some_and(|o| same_object(&self.current(), &o.current()))
    }

    fn describe(&self) -> String {
        format!("HotSwappableTargetSource for target [{}]", self.class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
