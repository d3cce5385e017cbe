//! Bean Factory - 最小化的 Bean 注册表
//!
//! 只提供 AOP 运行时需要的能力：按名称获取对象、按类型列举名称、
//! 查询类型元数据，以及在创建时执行后置处理器。

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    bean::{Bean, BeanDefinition, Scope},
    error::{ContainerError, ContainerResult},
    lifecycle::BeanPostProcessor,
    reflect::ClassDescriptor,
};

/// 最基础的容器接口，可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    fn get_bean(&self, name: &str) -> ContainerResult<Bean>;

    fn contains_bean(&self, name: &str) -> bool;

    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;
}

/// 泛型扩展方法
pub trait BeanFactoryExt: BeanFactory {
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.get_bean(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::BeanTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 所有 Bean 名称，按注册顺序
    fn bean_names(&self) -> Vec<String>;

    /// 声明类型为 `type_id` 的 Bean 名称，按注册顺序
    fn bean_names_for_type(&self, type_id: TypeId) -> Vec<String>;

    fn class_descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>>;

    /// 按实例的运行时类型查找类型描述
    fn class_descriptor_for(&self, bean: &Bean) -> Option<Arc<ClassDescriptor>>;

    fn is_currently_in_creation(&self, name: &str) -> bool;

    /// 只执行实例化，不经过后置处理器
    fn instantiate_raw(&self, name: &str) -> ContainerResult<Bean>;
}

/// 正在创建的 Bean 集合
#[derive(Debug, Default)]
struct CreationTracker {
    creating: Mutex<HashSet<String>>,
}

impl CreationTracker {
    fn contains(&self, name: &str) -> bool {
        self.creating.lock().contains(name)
    }

    fn start<'a>(&'a self, name: &str) -> ContainerResult<CreationGuard<'a>> {
        if !self.creating.lock().insert(name.to_string()) {
            return Err(ContainerError::CurrentlyInCreation(name.to_string()));
        }
        Ok(CreationGuard {
            tracker: self,
            name: name.to_string(),
        })
    }
}

/// 离开作用域时清除创建标记
struct CreationGuard<'a> {
    tracker: &'a CreationTracker,
    name: String,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.creating.lock().remove(&self.name);
    }
}

/// `ListableBeanFactory` 的默认实现
pub struct DefaultListableBeanFactory {
    definitions: RwLock<HashMap<String, Arc<BeanDefinition>>>,

    /// 注册顺序
    names: RwLock<Vec<String>>,

    singletons: RwLock<HashMap<String, Bean>>,

    creation_tracker: CreationTracker,

    /// 按 order 排序，同 order 保持添加顺序
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,
}

impl DefaultListableBeanFactory {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            names: RwLock::new(Vec::new()),
            singletons: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::default(),
            bean_post_processors: RwLock::new(Vec::new()),
        }
    }

    pub fn register_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        let name = definition.name.clone();
        {
            let mut definitions = self.definitions.write();
            if definitions.contains_key(&name) {
                tracing::warn!("Bean '{}' already exists, registration failed", name);
                return Err(ContainerError::DuplicateBean(name));
            }
            tracing::trace!(
                "Registering bean '{}' of class '{}' ({:?})",
                name,
                definition.class.name(),
                definition.scope
            );
            definitions.insert(name.clone(), Arc::new(definition));
        }
        self.names.write().push(name);
        Ok(())
    }

    /// 注册一个已有实例（单例，首次获取时执行后置处理器）
    pub fn register_instance(
        &self,
        name: impl Into<String>,
        class: Arc<ClassDescriptor>,
        instance: Bean,
    ) -> ContainerResult<()> {
        self.register_definition(BeanDefinition::of_instance(name, class, instance))
    }

    pub fn register_factory<F>(
        &self,
        name: impl Into<String>,
        class: Arc<ClassDescriptor>,
        scope: Scope,
        factory: F,
    ) -> ContainerResult<()>
    where
        F: Fn() -> anyhow::Result<Bean> + Send + Sync + 'static,
    {
        self.register_definition(BeanDefinition::new(name, class, factory).with_scope(scope))
    }

    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        tracing::debug!(
            "Adding bean post-processor '{}' (order {})",
            processor.name(),
            processor.order()
        );
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);
        processors.sort_by_key(|p| p.order());
    }

    pub fn bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    pub fn definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    /// 创建所有非延迟单例
    pub fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let names: Vec<String> = {
            let definitions = self.definitions.read();
            self.names
                .read()
                .iter()
                .filter(|n| {
                    definitions
                        .get(n.as_str())
                        .is_some_and(|d| d.is_singleton() && !d.lazy)
                })
                .cloned()
                .collect()
        };

        tracing::debug!("Pre-instantiating {} singleton beans", names.len());
        for name in names {
            self.get_bean(&name)?;
        }
        Ok(())
    }

    fn instantiate(&self, definition: &BeanDefinition) -> ContainerResult<Bean> {
        (definition.factory)().map_err(|e| ContainerError::BeanCreationFailed {
            name: definition.name.clone(),
            message: format!("{:#}", e),
        })
    }

    /// 实例化并执行后置处理器，期间不持有任何锁，后置处理器可以回调本工厂
    fn create_bean(&self, definition: &BeanDefinition) -> ContainerResult<Bean> {
        let _guard = self.creation_tracker.start(&definition.name)?;

        let mut bean = self.instantiate(definition)?;

        let processors = self.bean_post_processors();
        for processor in &processors {
            bean = processor.post_process_before_initialization(bean, &definition.name)?;
        }
        for processor in &processors {
            bean = processor.post_process_after_initialization(bean, &definition.name)?;
        }

        Ok(bean)
    }
}

impl Default for DefaultListableBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<Bean> {
        tracing::trace!("Requesting bean: '{}'", name);
        let definition = self.definition(name)?;

        match definition.scope {
            Scope::Singleton => {
                if let Some(bean) = self.singletons.read().get(name) {
                    return Ok(Arc::clone(bean));
                }

                tracing::debug!("Creating shared instance of singleton bean '{}'", name);
                let bean = self.create_bean(&definition)?;

                let mut singletons = self.singletons.write();
                let cached = singletons
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&bean));
                Ok(Arc::clone(cached))
            }
            Scope::Prototype => {
                tracing::trace!("Creating new instance of prototype bean '{}'", name);
                self.create_bean(&definition)
            }
        }
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        Ok(self.definition(name)?.is_singleton())
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn bean_names(&self) -> Vec<String> {
        self.names.read().clone()
    }

    fn bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        let definitions = self.definitions.read();
        self.names
            .read()
            .iter()
            .filter(|n| {
                definitions
                    .get(n.as_str())
                    .is_some_and(|d| ClassDescriptor::type_id(&d.class) == Some(type_id))
            })
            .cloned()
            .collect()
    }

    fn class_descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.definitions.read().get(name).map(|d| Arc::clone(&d.class))
    }

    fn class_descriptor_for(&self, bean: &Bean) -> Option<Arc<ClassDescriptor>> {
        let definitions = self.definitions.read();
        self.names
            .read()
            .iter()
            .filter_map(|n| definitions.get(n.as_str()))
            .find(|d| d.class.is_instance(bean))
            .map(|d| Arc::clone(&d.class))
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.contains(name)
    }

    fn instantiate_raw(&self, name: &str) -> ContainerResult<Bean> {
        let definition = self.definition(name)?;
        self.instantiate(&definition)
    }
}
