//! 集成测试共用的支付服务

#![allow(dead_code)]

use chimera_aop::prelude::*;
use chimera_core::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

pub fn record(journal: &Journal, entry: impl Into<String>) {
    journal.lock().push(entry.into());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub amount: u64,
    pub processed_by: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("refund of {0} exceeds the limit")]
pub struct RefundLimitExceeded(pub u64);

pub struct PaymentServiceImpl {
    pub id: u32,
    pub journal: Journal,
}

pub fn payment_interface() -> Arc<InterfaceDescriptor> {
    Arc::new(
        InterfaceDescriptor::new("PaymentService")
            .method("charge", |m| m.param("u64").returns(ReturnType::Value("Receipt".into())))
            .method("refund", |m| m.param("u64"))
            .method("to_string", |m| m.returns(ReturnType::Value("String".into())))
            .method("charge_twice", |m| m.param("u64").returns(ReturnType::Value("u64".into())))
            .method("self_ref", |m| m.returns(ReturnType::Interface("PaymentService".into())))
            .method("unwrap_self", |m| m.returns(ReturnType::Value("PaymentServiceImpl".into()))),
    )
}

pub fn payment_class() -> Arc<ClassDescriptor> {
    let invoker = ReflectiveInvoker::<PaymentServiceImpl>::new()
        .method("charge", |svc, args| {
            let amount = *args.get::<u64>(0)?;
            record(&svc.journal, "target:charge");
            Ok(value(Receipt {
                amount,
                processed_by: svc.id,
            }))
        })
        .method("refund", |svc, args| {
            let amount = *args.get::<u64>(0)?;
            record(&svc.journal, "target:refund");
            if amount > 100 {
                return Err(RefundLimitExceeded(amount).into());
            }
            Ok(unit())
        })
        .method("to_string", |svc, _| Ok(value(format!("PaymentServiceImpl#{}", svc.id))))
        .method("charge_twice", |svc, args| {
            let amount = *args.get::<u64>(0)?;
            record(&svc.journal, "target:charge_twice");
            let proxy = AopContext::current_proxy()?;
            let first = proxy.call::<Receipt>("charge", args![amount])?;
            let second = proxy.call::<Receipt>("charge", args![amount])?;
            Ok(value(first.amount + second.amount))
        })
        .method("self_ref", |svc, _| Ok(Arc::clone(svc) as Value))
        .method("unwrap_self", |svc, _| Ok(Arc::clone(svc) as Value));

    Arc::new(
        ClassDescriptor::of::<PaymentServiceImpl>()
            .implements(payment_interface())
            .invoker(invoker),
    )
}

pub fn payment_service(id: u32, journal: &Journal) -> Value {
    value(PaymentServiceImpl {
        id,
        journal: Arc::clone(journal),
    })
}

/// 前置通知：记录标签
pub fn recording_before(journal: &Journal, label: &str) -> Advice {
    let journal = Arc::clone(journal);
    let label = label.to_string();
    Advice::before_fn(move |_| {
        record(&journal, label.clone());
        Ok(())
    })
}

pub fn advisor_names(proxy: &Arc<AopProxy>, method: &str) -> Vec<String> {
    let advised = proxy.advised().unwrap();
    let method = advised.find_method(method).unwrap().clone();
    advised
        .chain_for(&method)
        .unwrap()
        .names()
        .into_iter()
        .map(String::from)
        .collect()
}
