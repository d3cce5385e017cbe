//! 顾问注册表
//!
//! 自动代理创建器通过 `AdvisorRegistry` 获取候选顾问、对象的类型描述和
//! 按名称引用的公共拦截器。提供两个实现：内存注册表 `AspectRegistry`
//! 和基于 Bean 工厂的 `BeanFactoryAdvisorRegistry`。

use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::aspect::{Aspect, StaticAspectSource};
use crate::error::{AopConfigError, AopResult};
use chimera_core::bean::Bean;
use chimera_core::bean_factory::{BeanFactory, DefaultListableBeanFactory, ListableBeanFactory};
use chimera_core::reflect::ClassDescriptor;
use chimera_core::ContainerError;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub trait AdvisorRegistry: Send + Sync {
    /// 所有候选顾问，按注册顺序
    fn candidate_advisors(&self) -> AopResult<Vec<Arc<Advisor>>>;

    /// 对象的类型描述（决定接口和反射调用器）
    fn class_of(&self, bean: &Bean, bean_name: &str) -> Option<Arc<ClassDescriptor>>;

    /// 按名称解析公共拦截器
    fn interceptor(&self, name: &str) -> AopResult<Vec<Arc<Advisor>>>;

    fn is_singleton(&self, _bean_name: &str) -> bool {
        true
    }

    /// 创建一个未经后置处理的新实例（原型目标来源使用）
    fn instantiate_raw(&self, bean_name: &str) -> AopResult<Bean> {
        Err(AopConfigError::Container(ContainerError::BeanNotFound(
            bean_name.to_string(),
        )))
    }
}

/// 把拦截器 Bean 转为顾问：顾问原样使用，切面按声明顺序展开，通知包装为匹配所有方法的顾问
fn interceptor_advisors(name: &str, bean: &Bean) -> AopResult<Vec<Arc<Advisor>>> {
    if let Some(advisor) = bean.downcast_ref::<Advisor>() {
        return Ok(vec![Arc::new(advisor.clone())]);
    }
    if let Some(aspect) = bean.downcast_ref::<Aspect>() {
        return Ok(aspect.advisors().into_iter().map(Arc::new).collect());
    }
    if let Some(advice) = bean.downcast_ref::<Advice>() {
        return Ok(vec![Arc::new(Advisor::always(name, advice.clone()))]);
    }
    Err(AopConfigError::UnknownInterceptor {
        name: name.to_string(),
        reason: "bean is neither an advisor, an aspect nor an advice".to_string(),
    })
}

/// 内存注册表
pub struct AspectRegistry {
    advisors: RwLock<Vec<Arc<Advisor>>>,
    classes: RwLock<Vec<Arc<ClassDescriptor>>>,
    interceptors: RwLock<HashMap<String, Vec<Arc<Advisor>>>>,
    include_static: bool,
}

impl AspectRegistry {
    pub fn new() -> Self {
        Self {
            advisors: RwLock::new(Vec::new()),
            classes: RwLock::new(Vec::new()),
            interceptors: RwLock::new(HashMap::new()),
            include_static: false,
        }
    }

    /// 同时提供通过 inventory 静态注册的切面
    pub fn with_static_aspects(mut self) -> Self {
        self.include_static = true;
        self
    }

    pub fn register_advisor(&self, advisor: Arc<Advisor>) {
        tracing::debug!("Registering advisor: {}", advisor);
        self.advisors.write().push(advisor);
    }

    /// 注册切面，按声明顺序展开为顾问
    pub fn register_aspect(&self, aspect: &Aspect) {
        tracing::debug!("Registering aspect '{}' with {} advice", aspect.name(), aspect.len());
        self.advisors
            .write()
            .extend(aspect.advisors().into_iter().map(Arc::new));
    }

    pub fn register_class(&self, class: Arc<ClassDescriptor>) {
        self.classes.write().push(class);
    }

    /// 注册可以按名称引用的公共拦截器
    pub fn register_interceptor(&self, name: impl Into<String>, advice: Advice) {
        let name = name.into();
        let advisor = Arc::new(Advisor::always(name.clone(), advice));
        self.interceptors.write().insert(name, vec![advisor]);
    }

    pub fn register_interceptor_advisor(&self, name: impl Into<String>, advisor: Arc<Advisor>) {
        self.interceptors.write().insert(name.into(), vec![advisor]);
    }

    pub fn len(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.read().is_empty()
    }

    pub fn clear(&self) {
        self.advisors.write().clear();
        self.interceptors.write().clear();
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorRegistry for AspectRegistry {
    fn candidate_advisors(&self) -> AopResult<Vec<Arc<Advisor>>> {
        let mut advisors = self.advisors.read().clone();
        if self.include_static {
            advisors.extend(StaticAspectSource::advisors()?.into_iter().map(Arc::new));
        }
        Ok(advisors)
    }

    fn class_of(&self, bean: &Bean, _bean_name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes
            .read()
            .iter()
            .find(|class| class.is_instance(bean))
            .cloned()
    }

    fn interceptor(&self, name: &str) -> AopResult<Vec<Arc<Advisor>>> {
        self.interceptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AopConfigError::UnknownInterceptor {
                name: name.to_string(),
                reason: "no interceptor registered under this name".to_string(),
            })
    }
}

/// 从 Bean 工厂收集顾问
///
/// 类型为 `Advisor` 和 `Aspect` 的 Bean 都是候选；正在创建中的 Bean 会被跳过。
/// 只持有工厂的弱引用，工厂本身持有使用本注册表的后置处理器。
pub struct BeanFactoryAdvisorRegistry {
    factory: Weak<DefaultListableBeanFactory>,
    include_static: bool,
}

impl BeanFactoryAdvisorRegistry {
    pub fn new(factory: &Arc<DefaultListableBeanFactory>) -> Self {
        Self {
            factory: Arc::downgrade(factory),
            include_static: false,
        }
    }

    pub fn with_static_aspects(mut self) -> Self {
        self.include_static = true;
        self
    }

    fn factory(&self) -> AopResult<Arc<DefaultListableBeanFactory>> {
        self.factory.upgrade().ok_or(AopConfigError::RegistryUnavailable)
    }
}

impl AdvisorRegistry for BeanFactoryAdvisorRegistry {
    fn candidate_advisors(&self) -> AopResult<Vec<Arc<Advisor>>> {
        let factory = self.factory()?;
        let advisor_type = TypeId::of::<Advisor>();
        let aspect_type = TypeId::of::<Aspect>();

        let mut advisors = Vec::new();
        for name in factory.bean_names() {
            let type_id = factory.class_descriptor(&name).and_then(|c| ClassDescriptor::type_id(&c));
            if type_id != Some(advisor_type) && type_id != Some(aspect_type) {
                continue;
            }
            if factory.is_currently_in_creation(&name) {
                tracing::trace!("Skipping advisor bean '{}': currently in creation", name);
                continue;
            }
            let bean = factory.get_bean(&name)?;
            advisors.extend(interceptor_advisors(&name, &bean)?);
        }

        if self.include_static {
            advisors.extend(StaticAspectSource::advisors()?.into_iter().map(Arc::new));
        }

        tracing::trace!("Found {} candidate advisors", advisors.len());
        Ok(advisors)
    }

    fn class_of(&self, bean: &Bean, bean_name: &str) -> Option<Arc<ClassDescriptor>> {
        let factory = self.factory.upgrade()?;
        factory
            .class_descriptor(bean_name)
            .filter(|class| class.is_instance(bean))
            .or_else(|| factory.class_descriptor_for(bean))
    }

    fn interceptor(&self, name: &str) -> AopResult<Vec<Arc<Advisor>>> {
        let factory = self.factory()?;
        let bean = factory
            .get_bean(name)
            .map_err(|e| AopConfigError::UnknownInterceptor {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        interceptor_advisors(name, &bean)
    }

    fn is_singleton(&self, bean_name: &str) -> bool {
        self.factory
            .upgrade()
            .and_then(|f| f.is_singleton(bean_name).ok())
            .unwrap_or(true)
    }

    fn instantiate_raw(&self, bean_name: &str) -> AopResult<Bean> {
        Ok(self.factory()?.instantiate_raw(bean_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::PointcutExpression;
    use chimera_core::bean::Scope;
    use chimera_core::reflect::value;

    struct Repository;

    fn tx_aspect() -> Aspect {
        Aspect::new("Tx")
            .advise("begin", PointcutExpression::All, Advice::before_fn(|_| Ok(())))
            .advise("commit", PointcutExpression::All, Advice::after_returning_fn(|_, _| Ok(())))
    }

    #[test]
    fn test_memory_registry() {
        let registry = AspectRegistry::new();
        registry.register_advisor(Arc::new(Advisor::always("audit", Advice::before_fn(|_| Ok(())))));
        registry.register_aspect(&tx_aspect());
        registry.register_class(Arc::new(ClassDescriptor::of::<Repository>()));

        let names: Vec<String> = registry
            .candidate_advisors()
            .unwrap()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["audit", "begin", "commit"]);

        let class = registry.class_of(&value(Repository), "repository").unwrap();
        assert_eq!(class.name(), "Repository");
        assert!(registry.class_of(&value(1u8), "number").is_none());

        assert!(matches!(
            registry.interceptor("missing"),
            Err(AopConfigError::UnknownInterceptor { .. })
        ));
    }

    #[test]
    fn test_bean_factory_registry() {
        let factory = Arc::new(DefaultListableBeanFactory::new());
        factory
            .register_instance(
                "auditAdvisor",
                Arc::new(ClassDescriptor::of::<Advisor>()),
                value(Advisor::always("audit", Advice::before_fn(|_| Ok(())))),
            )
            .unwrap();
        factory
            .register_instance("txAspect", Arc::new(ClassDescriptor::of::<Aspect>()), value(tx_aspect()))
            .unwrap();
        factory
            .register_factory(
                "repository",
                Arc::new(ClassDescriptor::of::<Repository>()),
                Scope::Prototype,
                || Ok(value(Repository)),
            )
            .unwrap();
        factory
            .register_instance(
                "timing",
                Arc::new(ClassDescriptor::of::<Advice>()),
                value(Advice::around_fn(|inv| inv.proceed())),
            )
            .unwrap();

        let registry = BeanFactoryAdvisorRegistry::new(&factory);
        let candidates = registry.candidate_advisors().unwrap();
        let names: Vec<&str> = candidates.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["audit", "begin", "commit"]);

        let timing = registry.interceptor("timing").unwrap();
        assert_eq!(timing[0].name(), "timing");
        assert!(matches!(
            registry.interceptor("repository"),
            Err(AopConfigError::UnknownInterceptor { .. })
        ));

        assert!(!registry.is_singleton("repository"));
        assert!(registry.instantiate_raw("repository").unwrap().is::<Repository>());

        drop(factory);
        assert!(matches!(
            registry.candidate_advisors(),
            Err(AopConfigError::RegistryUnavailable)
        ));
    }
}
