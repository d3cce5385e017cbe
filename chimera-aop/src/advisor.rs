//! 顾问（Advisor）：一个切点 + 一个通知
//!
//! 顾问携带排序所需的全部信息：所属切面、在切面中的声明位置、显式顺序。

use crate::advice::{same_arc, Advice, AdviceType};
use crate::pointcut::{Pointcut, PointcutExpression};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 未指定顺序时的默认值（最低优先级）
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 顾问在链中所属的段
///
/// 只有 `Sorted` 段参与优先级排序；`Leading` 和 `Trailing` 段按加入顺序固定在排序段之前或之后。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChainSegment {
    Leading,
    #[default]
    Sorted,
    Trailing,
}

#[derive(Clone)]
pub struct Advisor {
    name: String,
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    aspect_name: Option<String>,
    declaration_order: usize,
    order: Option<i32>,
    segment: ChainSegment,
}

impl Advisor {
    pub fn new(name: impl Into<String>, pointcut: impl Pointcut + 'static, advice: Advice) -> Self {
        Self::with_shared_pointcut(name, Arc::new(pointcut), advice)
    }

    pub fn with_shared_pointcut(
        name: impl Into<String>,
        pointcut: Arc<dyn Pointcut>,
        advice: Advice,
    ) -> Self {
        Self {
            name: name.into(),
            pointcut,
            advice,
            aspect_name: None,
            declaration_order: 0,
            order: None,
            segment: ChainSegment::Sorted,
        }
    }

    /// 匹配所有方法的顾问
    pub fn always(name: impl Into<String>, advice: Advice) -> Self {
        Self::new(name, PointcutExpression::All, advice)
    }

    /// 指定显式顺序（越小优先级越高）
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 归属到某个切面
    pub fn in_aspect(mut self, aspect_name: impl Into<String>, declaration_order: usize) -> Self {
        self.aspect_name = Some(aspect_name.into());
        self.declaration_order = declaration_order;
        self
    }

    /// 固定到链的某一段
    pub fn in_segment(mut self, segment: ChainSegment) -> Self {
        self.segment = segment;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn advice_type(&self) -> AdviceType {
        self.advice.advice_type()
    }

    pub fn aspect_name(&self) -> Option<&str> {
        self.aspect_name.as_deref()
    }

    pub fn declaration_order(&self) -> usize {
        self.declaration_order
    }

    pub fn explicit_order(&self) -> Option<i32> {
        self.order
    }

    pub fn segment(&self) -> ChainSegment {
        self.segment
    }

    /// 有效顺序，未指定时为最低优先级
    pub fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

impl PartialEq for Advisor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.aspect_name == other.aspect_name
            && self.declaration_order == other.declaration_order
            && self.order == other.order
            && self.segment == other.segment
            && self.advice.same_instance(&other.advice)
            && same_arc(&self.pointcut, &other.pointcut)
    }
}

impl Eq for Advisor {}

impl Hash for Advisor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.aspect_name.hash(state);
        self.declaration_order.hash(state);
        self.order.hash(state);
        self.segment.hash(state);
        self.advice.addr().hash(state);
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.name)
            .field("advice", &self.advice.advice_type())
            .field("aspect", &self.aspect_name)
            .field("declaration_order", &self.declaration_order)
            .field("order", &self.order)
            .field("segment", &self.segment)
            .field("pointcut", &self.pointcut.describe())
            .finish()
    }
}

impl fmt::Display for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.aspect_name {
            Some(aspect) => write!(f, "{}.{} ({})", aspect, self.name, self.advice.advice_type()),
            None => write!(f, "{} ({})", self.name, self.advice.advice_type()),
        }
    }
}
