//! 通知优先级
//!
//! `AspectPrecedenceComparator` 给出顾问之间的偏序，
//! `PrecedenceSorter` 在偏序上做稳定拓扑排序：不可比较的顾问保持原有相对位置，
//! 可比较的顾问按优先级排列，真正的环路作为配置错误报告。

use crate::advisor::{Advisor, ChainSegment};
use crate::context::ExposeInvocationInterceptor;
use crate::error::{AopConfigError, AopResult};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 两个顾问之间的优先级关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// 左侧优先级更高（在链中更靠前）
    Higher,
    Lower,
    Incomparable,
}

impl Precedence {
    pub fn reverse(self) -> Self {
        match self {
            Precedence::Higher => Precedence::Lower,
            Precedence::Lower => Precedence::Higher,
            Precedence::Incomparable => Precedence::Incomparable,
        }
    }
}

pub trait PrecedenceComparator: Send + Sync {
    fn compare(&self, a: &Advisor, b: &Advisor) -> Precedence;
}

/// 基于切面归属、声明顺序、通知类型和显式顺序的比较器
///
/// 1. 不同切面（或任一方没有切面）：按显式顺序比较，相等则不可比较
/// 2. 同一切面、显式顺序相等：有后置族通知参与时后声明的优先，否则先声明的优先
/// 3. 同一切面中一个后置族一个前置族，或声明位置相同：不可比较
#[derive(Debug, Default, Clone, Copy)]
pub struct AspectPrecedenceComparator;

impl AspectPrecedenceComparator {
    fn by_order(a: &Advisor, b: &Advisor) -> Precedence {
        match a.order().cmp(&b.order()) {
            Ordering::Less => Precedence::Higher,
            Ordering::Greater => Precedence::Lower,
            Ordering::Equal => Precedence::Incomparable,
        }
    }

    fn within_aspect(a: &Advisor, b: &Advisor) -> Precedence {
        let (ta, tb) = (a.advice_type(), b.advice_type());
        if (ta.is_after_family() && tb.is_before_family())
            || (ta.is_before_family() && tb.is_after_family())
        {
            return Precedence::Incomparable;
        }

        let after_involved = ta.is_after_family() || tb.is_after_family();
        match a.declaration_order().cmp(&b.declaration_order()) {
            Ordering::Equal => Precedence::Incomparable,
            Ordering::Less if after_involved => Precedence::Lower,
            Ordering::Less => Precedence::Higher,
            Ordering::Greater if after_involved => Precedence::Higher,
            Ordering::Greater => Precedence::Lower,
        }
    }
}

impl PrecedenceComparator for AspectPrecedenceComparator {
    fn compare(&self, a: &Advisor, b: &Advisor) -> Precedence {
        let same_aspect = matches!(
            (a.aspect_name(), b.aspect_name()),
            (Some(x), Some(y)) if x == y
        );

        if same_aspect && a.order() == b.order() {
            Self::within_aspect(a, b)
        } else {
            Self::by_order(a, b)
        }
    }
}

/// 稳定拓扑排序
pub struct PrecedenceSorter {
    comparator: Arc<dyn PrecedenceComparator>,
}

impl Default for PrecedenceSorter {
    fn default() -> Self {
        Self::new(AspectPrecedenceComparator)
    }
}

impl PrecedenceSorter {
    pub fn new(comparator: impl PrecedenceComparator + 'static) -> Self {
        Self {
            comparator: Arc::new(comparator),
        }
    }

    /// 排序
    ///
    /// 暴露当前调用的辅助顾问固定在第 0 位，不参与排序。
    /// `Leading` / `Trailing` 段的顾问保持加入顺序，分别排在排序结果之前和之后。
    pub fn sort(&self, advisors: Vec<Arc<Advisor>>) -> AopResult<Vec<Arc<Advisor>>> {
        let mut exposed = None;
        let mut leading = Vec::new();
        let mut sortable = Vec::with_capacity(advisors.len());
        let mut trailing = Vec::new();
        for advisor in advisors {
            if ExposeInvocationInterceptor::is_expose_invocation(&advisor) {
                exposed.get_or_insert(advisor);
                continue;
            }
            match advisor.segment() {
                ChainSegment::Leading => leading.push(advisor),
                ChainSegment::Sorted => sortable.push(advisor),
                ChainSegment::Trailing => trailing.push(advisor),
            }
        }

        let mut sorted = Vec::with_capacity(leading.len() + sortable.len() + trailing.len() + 1);
        sorted.extend(exposed);
        sorted.extend(leading);
        sorted.extend(self.sort_comparable(sortable)?);
        sorted.extend(trailing);
        Ok(sorted)
    }

    fn sort_comparable(&self, advisors: Vec<Arc<Advisor>>) -> AopResult<Vec<Arc<Advisor>>> {
        let n = advisors.len();
        if n < 2 {
            return Ok(advisors);
        }

        // edges[i] 包含 j 表示 i 必须排在 j 之前
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for i in 0..n {
            for j in (i + 1)..n {
                match self.comparator.compare(&advisors[i], &advisors[j]) {
                    Precedence::Higher => {
                        edges[i].push(j);
                        in_degree[j] += 1;
                    }
                    Precedence::Lower => {
                        edges[j].push(i);
                        in_degree[i] += 1;
                    }
                    Precedence::Incomparable => {}
                }
            }
        }

        if let Some(cycle) = find_cycle(&edges) {
            let names: Vec<String> = cycle.iter().map(|&i| advisors[i].to_string()).collect();
            tracing::warn!("Advice precedence circularity detected: {}", names.join(" -> "));
            return Err(AopConfigError::PrecedenceCircularity { advisors: names });
        }

        // Kahn 算法，每次取原始位置最小的可用节点
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &j in &edges[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        let mut slots: Vec<Option<Arc<Advisor>>> = advisors.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// DFS 回边检测，返回环上的节点（按原始位置排序）
fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    let n = edges.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..n {
        if marks[start] == Mark::Unvisited {
            if let Some(mut cycle) = visit(start, edges, &mut marks, &mut stack) {
                cycle.sort_unstable();
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    edges: &[Vec<usize>],
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    marks[node] = Mark::OnStack;
    stack.push(node);

    for &next in &edges[node] {
        match marks[next] {
            Mark::OnStack => {
                let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                return Some(stack[from..].to_vec());
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, edges, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    stack.pop();
    marks[node] = Mark::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;

    fn before(name: &str) -> Advisor {
        Advisor::always(name, Advice::before_fn(|_| Ok(())))
    }

    fn around(name: &str) -> Advisor {
        Advisor::always(name, Advice::around_fn(|inv| inv.proceed()))
    }

    fn after_returning(name: &str) -> Advisor {
        Advisor::always(name, Advice::after_returning_fn(|_, _| Ok(())))
    }

    fn names(advisors: &[Arc<Advisor>]) -> Vec<&str> {
        advisors.iter().map(|a| a.name()).collect()
    }

    fn sort(advisors: Vec<Advisor>) -> AopResult<Vec<Arc<Advisor>>> {
        PrecedenceSorter::default().sort(advisors.into_iter().map(Arc::new).collect())
    }

    #[test]
    fn test_different_aspects_by_order() {
        let logging = before("log").in_aspect("Logging", 0).with_order(2);
        let security = before("check").in_aspect("Security", 0).with_order(1);

        let cmp = AspectPrecedenceComparator;
        assert_eq!(cmp.compare(&security, &logging), Precedence::Higher);
        assert_eq!(cmp.compare(&logging, &security), Precedence::Lower);

        let sorted = sort(vec![logging, security]).unwrap();
        assert_eq!(names(&sorted), vec!["check", "log"]);
    }

    #[test]
    fn test_equal_order_across_aspects_is_stable() {
        let a = before("a").in_aspect("A", 0).with_order(1);
        let b = before("b").in_aspect("B", 0).with_order(1);
        assert_eq!(AspectPrecedenceComparator.compare(&a, &b), Precedence::Incomparable);

        assert_eq!(names(&sort(vec![b.clone(), a.clone()]).unwrap()), vec!["b", "a"]);
        assert_eq!(names(&sort(vec![a, b]).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_unordered_advisor_sorts_last() {
        let plain = before("plain");
        let ordered = before("ordered").with_order(10);
        assert_eq!(names(&sort(vec![plain, ordered]).unwrap()), vec!["ordered", "plain"]);
    }

    #[test]
    fn test_same_aspect_before_family_earlier_first() {
        let first = before("first").in_aspect("Tx", 0);
        let second = before("second").in_aspect("Tx", 1);
        assert_eq!(names(&sort(vec![second, first]).unwrap()), vec!["first", "second"]);
    }

    #[test]
    fn test_same_aspect_after_family_later_first() {
        let commit = after_returning("commit").in_aspect("Tx", 0);
        let audit = after_returning("auditLog").in_aspect("Tx", 1);
        assert_eq!(names(&sort(vec![commit, audit]).unwrap()), vec!["auditLog", "commit"]);
    }

    #[test]
    fn test_before_and_after_in_same_aspect_incomparable() {
        let b = before("b").in_aspect("Tx", 0);
        let a = after_returning("a").in_aspect("Tx", 1);
        assert_eq!(AspectPrecedenceComparator.compare(&b, &a), Precedence::Incomparable);
        assert_eq!(AspectPrecedenceComparator.compare(&a, &b), Precedence::Incomparable);
    }

    #[test]
    fn test_around_with_after_uses_after_rule() {
        let wrap = around("wrap").in_aspect("Tx", 0);
        let done = after_returning("done").in_aspect("Tx", 1);
        assert_eq!(AspectPrecedenceComparator.compare(&done, &wrap), Precedence::Higher);
    }

    #[test]
    fn test_genuine_cycle_names_all_advisors() {
        let a = around("A").in_aspect("Tx", 0);
        let b = after_returning("B").in_aspect("Tx", 1);
        let c = around("C").in_aspect("Tx", 2);

        match sort(vec![a, b, c]) {
            Err(AopConfigError::PrecedenceCircularity { advisors }) => {
                assert_eq!(advisors.len(), 3);
                for name in ["Tx.A", "Tx.B", "Tx.C"] {
                    assert!(advisors.iter().any(|a| a.starts_with(name)), "{:?}", advisors);
                }
            }
            other => panic!("expected circularity, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_expose_invocation_pinned_first() {
        let expose = ExposeInvocationInterceptor::advisor();
        let high = before("high").with_order(HIGH);
        let advisors = vec![Arc::new(high), Arc::clone(&expose)];

        let sorted = PrecedenceSorter::default().sort(advisors).unwrap();
        assert!(Arc::ptr_eq(&sorted[0], &expose));
        assert_eq!(sorted[1].name(), "high");
    }

    #[test]
    fn test_segments_keep_insertion_order() {
        let trace = before("trace").in_segment(ChainSegment::Leading);
        let audit = after_returning("audit").in_segment(ChainSegment::Trailing);
        let metrics = before("metrics").in_segment(ChainSegment::Leading).with_order(9);
        let check = before("check").in_aspect("Security", 0).with_order(1);
        let log = before("log").with_order(2);

        let sorted = sort(vec![audit, log, trace, check, metrics]).unwrap();
        assert_eq!(names(&sorted), vec!["trace", "metrics", "check", "log", "audit"]);

        let expose = ExposeInvocationInterceptor::advisor();
        let leading = Arc::new(before("trace").in_segment(ChainSegment::Leading));
        let sorted = PrecedenceSorter::default().sort(vec![leading, Arc::clone(&expose)]).unwrap();
        assert!(Arc::ptr_eq(&sorted[0], &expose));
    }

    const HIGH: i32 = crate::advisor::HIGHEST_PRECEDENCE;
}
