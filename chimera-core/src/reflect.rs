//! 类型元数据与反射调用
//!
//! Rust 没有运行时反射，这里用显式注册的元数据代替：
//! - `InterfaceDescriptor` / `MethodDescriptor` 描述接口和方法签名
//! - `ClassDescriptor` 描述一个具体类型实现了哪些接口，以及如何调用它的方法
//! - `MethodInvoker` 是"按运行时选择的方法调用目标对象"的能力，调用方无需知道具体类型

use crate::error::ReflectionError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 动态值：参数、返回值、目标对象都以此形式传递
pub type Value = Arc<dyn Any + Send + Sync>;

/// 包装任意值
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 无返回值的方法返回 `()`
pub fn unit() -> Value {
    Arc::new(())
}

/// 将动态值向下转型为具体类型
pub fn downcast<T: Any + Send + Sync>(v: &Value) -> Result<Arc<T>, ReflectionError> {
    Arc::clone(v)
        .downcast::<T>()
        .map_err(|_| ReflectionError::ValueType {
            expected: std::any::type_name::<T>(),
        })
}

/// 判断两个动态值是否指向同一个对象
pub fn same_object(a: &Value, b: &Value) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// 方法参数列表
#[derive(Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn push<T: Any + Send + Sync>(&mut self, v: T) {
        self.0.push(Arc::new(v));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 获取原始参数值
    pub fn value(&self, index: usize) -> Result<&Value, ReflectionError> {
        self.0.get(index).ok_or(ReflectionError::ArgumentIndex {
            index,
            len: self.0.len(),
        })
    }

    /// 获取指定类型的参数
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, ReflectionError> {
        self.value(index)?
            .downcast_ref::<T>()
            .ok_or(ReflectionError::ArgumentType {
                index,
                expected: std::any::type_name::<T>(),
            })
    }

    /// 替换指定位置的参数（供环绕通知改写参数）
    pub fn set(&mut self, index: usize, v: Value) -> Result<(), ReflectionError> {
        let len = self.0.len();
        let slot = self
            .0
            .get_mut(index)
            .ok_or(ReflectionError::ArgumentIndex { index, len })?;
        *slot = v;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args({})", self.0.len())
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 构造参数列表
///
/// ```
/// use chimera_core::args;
///
/// let args = args![42u64, "note".to_string()];
/// assert_eq!(*args.get::<u64>(0).unwrap(), 42);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::reflect::Args::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::reflect::Args::from_values(vec![
            $(::std::sync::Arc::new($arg) as $crate::reflect::Value),+
        ])
    };
}

/// 方法声明的返回类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// 无返回值
    Unit,
    /// 普通值类型（类型名仅用于描述）
    Value(String),
    /// 返回某个接口
    Interface(String),
    /// 任意对象
    Any,
}

/// 方法签名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    declaring_type: String,
    name: String,
    param_types: Vec<String>,
    return_type: ReturnType,
}

impl MethodDescriptor {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            param_types: Vec::new(),
            return_type: ReturnType::Unit,
        }
    }

    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.param_types.push(type_name.into());
        self
    }

    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    /// 完整签名，例如 `PaymentService::charge(u64)`
    pub fn signature(&self) -> String {
        format!(
            "{}::{}({})",
            self.declaring_type,
            self.name,
            self.param_types.join(", ")
        )
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// 接口描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// 声明一个方法，声明类型自动设为本接口
    pub fn method<F>(mut self, name: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(MethodDescriptor) -> MethodDescriptor,
    {
        let method = configure(MethodDescriptor::new(self.name.clone(), name));
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name() == name)
    }
}

/// 反射调用能力
///
/// 按运行时给定的方法签名调用目标对象，调用方不依赖目标的具体类型
pub trait MethodInvoker: Send + Sync {
    fn invoke(&self, target: &Value, method: &MethodDescriptor, args: &Args) -> anyhow::Result<Value>;
}

type Handler<T> = Box<dyn Fn(&Arc<T>, &Args) -> anyhow::Result<Value> + Send + Sync>;

/// 基于闭包表的 `MethodInvoker`
///
/// 每个方法名绑定一个闭包，闭包拿到的是已经向下转型的 `Arc<T>`，
/// 因此可以把目标自身作为返回值（`Ok(target.clone())`）。
pub struct ReflectiveInvoker<T> {
    handlers: HashMap<String, Handler<T>>,
}

impl<T: Any + Send + Sync> ReflectiveInvoker<T> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<T>, &Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }
}

impl<T: Any + Send + Sync> Default for ReflectiveInvoker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Send + Sync> MethodInvoker for ReflectiveInvoker<T> {
    fn invoke(&self, target: &Value, method: &MethodDescriptor, args: &Args) -> anyhow::Result<Value> {
        let handler = self
            .handlers
            .get(method.name())
            .ok_or_else(|| ReflectionError::NoSuchMethod {
                class: std::any::type_name::<T>().to_string(),
                method: method.signature(),
            })?;

        let typed = Arc::clone(target)
            .downcast::<T>()
            .map_err(|_| ReflectionError::TargetType {
                expected: std::any::type_name::<T>(),
            })?;

        handler(&typed, args)
    }
}

/// 具体类型描述
#[derive(Clone)]
pub struct ClassDescriptor {
    name: String,
    type_id: Option<TypeId>,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
    invoker: Option<Arc<dyn MethodInvoker>>,
}

impl ClassDescriptor {
    /// 为类型 `T` 创建描述，名称取类型名的最后一段
    pub fn of<T: Any>() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self {
            name: short.to_string(),
            type_id: Some(TypeId::of::<T>()),
            interfaces: Vec::new(),
            invoker: None,
        }
    }

    /// 创建不绑定具体类型的描述（例如空目标）
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            interfaces: Vec::new(),
            invoker: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn implements(mut self, interface: Arc<InterfaceDescriptor>) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn invoker<I: MethodInvoker + 'static>(mut self, invoker: I) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.interfaces
    }

    pub fn implements_interface(&self, name: &str) -> bool {
        self.interfaces.iter().any(|i| i.name() == name)
    }

    /// 所有接口上声明的方法
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.interfaces.iter().flat_map(|i| i.methods().iter())
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods().find(|m| m.name() == name)
    }

    pub fn method_invoker(&self) -> Option<&Arc<dyn MethodInvoker>> {
        self.invoker.as_ref()
    }

    /// 判断动态值是否是本类型的实例
    pub fn is_instance(&self, v: &Value) -> bool {
        match self.type_id {
            Some(id) => Any::type_id(&**v) == id,
            None => false,
        }
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Eq for ClassDescriptor {}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("has_invoker", &self.invoker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: String,
    }

    fn greeter_interface() -> Arc<InterfaceDescriptor> {
        Arc::new(
            InterfaceDescriptor::new("Greeter")
                .method("greet", |m| {
                    m.param("String").returns(ReturnType::Value("String".into()))
                })
                .method("itself", |m| m.returns(ReturnType::Interface("Greeter".into()))),
        )
    }

    fn greeter_class() -> ClassDescriptor {
        ClassDescriptor::of::<Greeter>()
            .implements(greeter_interface())
            .invoker(
                ReflectiveInvoker::<Greeter>::new()
                    .method("greet", |g, args| {
                        let name = args.get::<String>(0)?;
                        Ok(value(format!("{}, {}", g.greeting, name)))
                    })
                    .method("itself", |g, _| Ok(g.clone() as Value)),
            )
    }

    #[test]
    fn test_reflective_invoke() {
        let class = greeter_class();
        let target: Value = Arc::new(Greeter {
            greeting: "Hello".into(),
        });
        let method = class.find_method("greet").unwrap().clone();

        let result = class
            .method_invoker()
            .unwrap()
            .invoke(&target, &method, &args!["Ann".to_string()])
            .unwrap();

        assert_eq!(*downcast::<String>(&result).unwrap(), "Hello, Ann");
    }

    #[test]
    fn test_reflective_invoke_returns_same_object() {
        let class = greeter_class();
        let target: Value = Arc::new(Greeter {
            greeting: "Hi".into(),
        });
        let method = class.find_method("itself").unwrap().clone();

        let result = class
            .method_invoker()
            .unwrap()
            .invoke(&target, &method, &Args::new())
            .unwrap();

        assert!(same_object(&result, &target));
    }

    #[test]
    fn test_unknown_method() {
        let class = greeter_class();
        let target: Value = Arc::new(Greeter {
            greeting: "Hi".into(),
        });
        let method = MethodDescriptor::new("Greeter", "wave");

        let err = class
            .method_invoker()
            .unwrap()
            .invoke(&target, &method, &Args::new())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ReflectionError>(),
            Some(ReflectionError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_wrong_argument_type() {
        let args = args![7u32];
        assert_eq!(
            args.get::<String>(0).unwrap_err(),
            ReflectionError::ArgumentType {
                index: 0,
                expected: std::any::type_name::<String>()
            }
        );
        assert_eq!(
            args.get::<u32>(3).unwrap_err(),
            ReflectionError::ArgumentIndex { index: 3, len: 1 }
        );
    }

    #[test]
    fn test_class_descriptor_metadata() {
        let class = greeter_class();
        assert_eq!(class.name(), "Greeter");
        assert!(class.implements_interface("Greeter"));
        assert_eq!(class.methods().count(), 2);
        assert_eq!(
            class.find_method("greet").unwrap().signature(),
            "Greeter::greet(String)"
        );

        let instance: Value = Arc::new(Greeter {
            greeting: String::new(),
        });
        assert!(class.is_instance(&instance));
        assert!(!class.is_instance(&unit()));
    }
}
