//! 切点（Pointcut）表达式系统
//!
//! 切点是 `(目标类型, 方法签名) -> bool` 的纯谓词，只在解析拦截器链时调用。
//! 表达式在构建时编译，格式错误在构建时报告，匹配本身不会失败。

use crate::advisor::Advisor;
use crate::error::{AopConfigError, AopResult};
use chimera_core::reflect::{ClassDescriptor, MethodDescriptor, ReturnType};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    /// 类型级过滤，返回 false 时不再逐个检查方法
    fn matches_class(&self, _class: &ClassDescriptor) -> bool {
        true
    }

    fn matches(&self, class: &ClassDescriptor, method: &MethodDescriptor) -> bool;

    /// 用于日志和配置描述
    fn describe(&self) -> String {
        "custom pointcut".to_string()
    }
}

/// 通配符模式（支持 `*`）
///
/// - `*` 匹配任意字符串
/// - `User*` 以 User 开头
/// - `*Service` 以 Service 结尾
/// - `*Service*` 包含 Service
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> AopResult<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| AopConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

/// 参数列表模式
#[derive(Clone, Debug)]
pub enum ParamsPattern {
    /// `(..)` 任意参数
    Any,
    /// 逐个匹配参数类型名
    Exact(Vec<NamePattern>),
}

impl ParamsPattern {
    fn matches(&self, params: &[String]) -> bool {
        match self {
            ParamsPattern::Any => true,
            ParamsPattern::Exact(patterns) => {
                patterns.len() == params.len()
                    && patterns.iter().zip(params).all(|(p, t)| p.is_match(t))
            }
        }
    }
}

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配目标类型名，例如 `Type("*Service")`
    Type(NamePattern),

    /// 匹配方法名，例如 `Method("get*")`
    Method(NamePattern),

    /// 匹配某个接口声明的方法（或实现了该接口的类型上的所有方法）
    Interface(String),

    /// `execution(<返回类型> <类型>.<方法>(<参数>))`
    ///
    /// 类型模式同时匹配目标类型名和方法的声明接口名
    Execution {
        return_pattern: NamePattern,
        type_pattern: NamePattern,
        method_pattern: NamePattern,
        params: ParamsPattern,
    },

    TypeRegex(Regex),

    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&ClassDescriptor, &MethodDescriptor) -> bool + Send + Sync>),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    pub fn type_pattern(pattern: &str) -> AopResult<Self> {
        Ok(PointcutExpression::Type(NamePattern::new(pattern)?))
    }

    pub fn method_pattern(pattern: &str) -> AopResult<Self> {
        Ok(PointcutExpression::Method(NamePattern::new(pattern)?))
    }

    pub fn interface(name: impl Into<String>) -> Self {
        PointcutExpression::Interface(name.into())
    }

    pub fn type_regex(pattern: &str) -> AopResult<Self> {
        Ok(PointcutExpression::TypeRegex(compile_regex(pattern)?))
    }

    pub fn method_regex(pattern: &str) -> AopResult<Self> {
        Ok(PointcutExpression::MethodRegex(compile_regex(pattern)?))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ClassDescriptor, &MethodDescriptor) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Custom(Arc::new(f))
    }

    /// 解析切点表达式
    ///
    /// 支持 `execution(...)`、`within(Type)`、`method(name)`、`interface(Name)`，
    /// 以及 `&&`、`||`、前缀 `!` 组合（`||` 优先级最低，不支持括号分组）。
    ///
    /// ```
    /// use chimera_aop::pointcut::PointcutExpression;
    ///
    /// let pc = PointcutExpression::parse("execution(* PaymentService.charge(..)) && !method(to_string)");
    /// assert!(pc.is_ok());
    /// assert!(PointcutExpression::parse("execution(charge").is_err());
    /// ```
    pub fn parse(expression: &str) -> AopResult<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(malformed(expression, "empty expression"));
        }

        if let Some((left, right)) = trimmed.split_once("||") {
            return Ok(Self::parse(left)?.or(Self::parse(right)?));
        }
        if let Some((left, right)) = trimmed.split_once("&&") {
            return Ok(Self::parse(left)?.and(Self::parse(right)?));
        }
        if let Some(rest) = trimmed.strip_prefix('!') {
            return Ok(Self::parse(rest)?.not());
        }

        let (designator, body) = split_designator(trimmed)?;
        match designator {
            "execution" => Self::execution(body),
            "within" => Self::type_pattern(body.trim()),
            "method" => Self::method_pattern(body.trim()),
            "interface" => Ok(Self::interface(body.trim())),
            other => Err(malformed(
                trimmed,
                &format!("unknown designator '{}'", other),
            )),
        }
    }

    /// 解析 execution 表达式主体，例如 `* PaymentService.charge(..)`
    pub fn execution(body: &str) -> AopResult<Self> {
        let body = body.trim();
        let (return_part, signature) = body
            .split_once(char::is_whitespace)
            .ok_or_else(|| malformed(body, "expected '<return> <type>.<method>(<params>)'"))?;

        let signature = signature.trim();
        let open = signature
            .find('(')
            .ok_or_else(|| malformed(body, "missing parameter list"))?;
        if !signature.ends_with(')') {
            return Err(malformed(body, "unterminated parameter list"));
        }

        let name_part = &signature[..open];
        let params_part = signature[open + 1..signature.len() - 1].trim();

        let (type_part, method_part) = match name_part.rsplit_once('.') {
            Some((t, m)) => (t, m),
            None => ("*", name_part),
        };
        if method_part.is_empty() {
            return Err(malformed(body, "missing method name"));
        }

        let params = if params_part == ".." {
            ParamsPattern::Any
        } else if params_part.is_empty() {
            ParamsPattern::Exact(Vec::new())
        } else {
            ParamsPattern::Exact(
                params_part
                    .split(',')
                    .map(|p| NamePattern::new(p.trim()))
                    .collect::<AopResult<Vec<_>>>()?,
            )
        };

        Ok(PointcutExpression::Execution {
            return_pattern: NamePattern::new(return_part)?,
            type_pattern: NamePattern::new(type_part)?,
            method_pattern: NamePattern::new(method_part)?,
            params,
        })
    }

    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }

    pub fn evaluate(&self, class: &ClassDescriptor, method: &MethodDescriptor) -> bool {
        match self {
            PointcutExpression::All => true,
            PointcutExpression::Type(p) => p.is_match(class.name()),
            PointcutExpression::Method(p) => p.is_match(method.name()),
            PointcutExpression::Interface(name) => {
                method.declaring_type() == name || class.implements_interface(name)
            }
            PointcutExpression::Execution {
                return_pattern,
                type_pattern,
                method_pattern,
                params,
            } => {
                (type_pattern.is_match(class.name())
                    || type_pattern.is_match(method.declaring_type()))
                    && method_pattern.is_match(method.name())
                    && params.matches(method.param_types())
                    && return_pattern.is_match(&return_type_name(method.return_type()))
            }
            PointcutExpression::TypeRegex(r) => r.is_match(class.name()),
            PointcutExpression::MethodRegex(r) => r.is_match(method.name()),
            PointcutExpression::Custom(f) => f(class, method),
            PointcutExpression::And(l, r) => l.evaluate(class, method) && r.evaluate(class, method),
            PointcutExpression::Or(l, r) => l.evaluate(class, method) || r.evaluate(class, method),
            PointcutExpression::Not(e) => !e.evaluate(class, method),
        }
    }
}

impl Pointcut for PointcutExpression {
    fn matches_class(&self, class: &ClassDescriptor) -> bool {
        match self {
            PointcutExpression::Type(p) => p.is_match(class.name()),
            PointcutExpression::TypeRegex(r) => r.is_match(class.name()),
            PointcutExpression::And(l, r) => l.matches_class(class) && r.matches_class(class),
            _ => true,
        }
    }

    fn matches(&self, class: &ClassDescriptor, method: &MethodDescriptor) -> bool {
        self.evaluate(class, method)
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::Type(p) => write!(f, "Type({})", p.as_str()),
            PointcutExpression::Method(p) => write!(f, "Method({})", p.as_str()),
            PointcutExpression::Interface(n) => write!(f, "Interface({})", n),
            PointcutExpression::Execution {
                return_pattern,
                type_pattern,
                method_pattern,
                params,
            } => {
                let params = match params {
                    ParamsPattern::Any => "..".to_string(),
                    ParamsPattern::Exact(ps) => ps
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                write!(
                    f,
                    "execution({} {}.{}({}))",
                    return_pattern.as_str(),
                    type_pattern.as_str(),
                    method_pattern.as_str(),
                    params
                )
            }
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

fn compile_regex(pattern: &str) -> AopResult<Regex> {
    Regex::new(pattern).map_err(|e| AopConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn malformed(expression: &str, reason: &str) -> AopConfigError {
    AopConfigError::MalformedPointcut {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

/// `within(Foo)` -> ("within", "Foo")
fn split_designator(expr: &str) -> AopResult<(&str, &str)> {
    let open = expr
        .find('(')
        .ok_or_else(|| malformed(expr, "expected '<designator>(...)'"))?;
    if !expr.ends_with(')') {
        return Err(malformed(expr, "unbalanced parentheses"));
    }
    let designator = expr[..open].trim();
    let body = &expr[open + 1..expr.len() - 1];
    if designator.is_empty() {
        return Err(malformed(expr, "missing designator"));
    }
    Ok((designator, body))
}

fn return_type_name(return_type: &ReturnType) -> String {
    match return_type {
        ReturnType::Unit => "()".to_string(),
        ReturnType::Value(name) | ReturnType::Interface(name) => name.clone(),
        ReturnType::Any => "Any".to_string(),
    }
}

/// 切点匹配器：判断一个顾问是否适用于某个（类型，方法）
pub struct PointcutMatcher;

impl PointcutMatcher {
    pub fn matches(advisor: &Advisor, class: &ClassDescriptor, method: &MethodDescriptor) -> bool {
        let pointcut = advisor.pointcut();
        pointcut.matches_class(class) && pointcut.matches(class, method)
    }

    /// 该顾问是否适用于类型上的至少一个方法
    pub fn can_apply(advisor: &Advisor, class: &ClassDescriptor) -> bool {
        let pointcut = advisor.pointcut();
        pointcut.matches_class(class) && class.methods().any(|m| pointcut.matches(class, m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::reflect::InterfaceDescriptor;

    struct PaymentServiceImpl;

    fn payment_class() -> ClassDescriptor {
        let iface = InterfaceDescriptor::new("PaymentService")
            .method("charge", |m| m.param("u64").returns(ReturnType::Value("Receipt".into())))
            .method("refund", |m| m.param("u64").param("String"))
            .method("to_string", |m| m.returns(ReturnType::Value("String".into())));
        ClassDescriptor::of::<PaymentServiceImpl>().implements(Arc::new(iface))
    }

    fn method(class: &ClassDescriptor, name: &str) -> MethodDescriptor {
        class.find_method(name).cloned().unwrap()
    }

    #[test]
    fn test_name_pattern() {
        let p = NamePattern::new("*Service").unwrap();
        assert!(p.is_match("PaymentService"));
        assert!(!p.is_match("PaymentServiceImpl"));

        let p = NamePattern::new("get*").unwrap();
        assert!(p.is_match("get_user"));
        assert!(!p.is_match("forget"));

        // 正则元字符按字面匹配
        let p = NamePattern::new("a.b").unwrap();
        assert!(p.is_match("a.b"));
        assert!(!p.is_match("axb"));
    }

    #[test]
    fn test_execution_matches_interface_name() {
        let class = payment_class();
        let pc = PointcutExpression::parse("execution(* PaymentService.charge(..))").unwrap();

        assert!(pc.matches(&class, &method(&class, "charge")));
        assert!(!pc.matches(&class, &method(&class, "refund")));
    }

    #[test]
    fn test_execution_params_and_return() {
        let class = payment_class();
        let pc = PointcutExpression::parse("execution(() *.refund(u64, String))").unwrap();
        assert!(pc.matches(&class, &method(&class, "refund")));

        let pc = PointcutExpression::parse("execution(* *.refund(u64))").unwrap();
        assert!(!pc.matches(&class, &method(&class, "refund")));

        let pc = PointcutExpression::parse("execution(Receipt charge(*))").unwrap();
        assert!(pc.matches(&class, &method(&class, "charge")));
    }

    #[test]
    fn test_combinators() {
        let class = payment_class();
        let pc = PointcutExpression::parse("within(*Impl) && !method(to_string)").unwrap();

        assert!(pc.matches(&class, &method(&class, "charge")));
        assert!(!pc.matches(&class, &method(&class, "to_string")));

        let pc = PointcutExpression::parse("method(charge) || method(refund)").unwrap();
        assert!(pc.matches(&class, &method(&class, "refund")));
        assert!(!pc.matches(&class, &method(&class, "to_string")));
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in [
            "",
            "execution(charge",
            "execution(*)",
            "execution(* Foo.(..))",
            "call(* Foo.bar(..))",
            "within",
        ] {
            let err = PointcutExpression::parse(expr).unwrap_err();
            assert!(
                matches!(err, AopConfigError::MalformedPointcut { .. }),
                "{}: {:?}",
                expr,
                err
            );
        }

        assert!(matches!(
            PointcutExpression::method_regex("(unclosed").unwrap_err(),
            AopConfigError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_class_filter() {
        let class = payment_class();
        let pc = PointcutExpression::type_pattern("Order*").unwrap();
        assert!(!pc.matches_class(&class));

        let pc = PointcutExpression::interface("PaymentService");
        assert!(pc.matches_class(&class));
        assert!(pc.matches(&class, &method(&class, "to_string")));
    }
}
