// chimera-core: Chimera 框架的基础设施
//
// 为 AOP 运行时提供：
// - 类型元数据与反射调用（接口、方法签名、MethodInvoker）
// - 最小化的 Bean 注册表与后置处理器
// - 配置（Environment / PropertySource）
// - 日志初始化

pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod reflect;

// 重新导出常用类型
pub use bean::{Bean, BeanDefinition, InstanceFactory, Scope};
pub use bean_factory::{BeanFactory, BeanFactoryExt, DefaultListableBeanFactory, ListableBeanFactory};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{ContainerError, ContainerResult, ReflectionError};
pub use lifecycle::BeanPostProcessor;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use reflect::{
    downcast, same_object, unit, value, Args, ClassDescriptor, InterfaceDescriptor,
    MethodDescriptor, MethodInvoker, ReflectiveInvoker, ReturnType, Value,
};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::args;
    pub use crate::bean::{Bean, BeanDefinition, Scope};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, DefaultListableBeanFactory, ListableBeanFactory,
    };
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::BeanPostProcessor;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::reflect::{
        downcast, same_object, unit, value, Args, ClassDescriptor, InterfaceDescriptor,
        MethodDescriptor, MethodInvoker, ReflectiveInvoker, ReturnType, Value,
    };
    pub use anyhow::{anyhow, Context};
}
