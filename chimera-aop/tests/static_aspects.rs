mod common;

use chimera_aop::prelude::*;
use chimera_aop::{StaticAspectSource, TraceInterceptor};
use chimera_core::prelude::*;
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static AUDITED: AtomicUsize = AtomicUsize::new(0);

fn audit_aspect() -> AopResult<Aspect> {
    Aspect::new("Audit").order(10).after_returning(
        "audited",
        "execution(* PaymentService.charge(..))",
        |_, _| {
            AUDITED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )
}

fn metrics_aspect() -> AopResult<Aspect> {
    Aspect::new("Metrics").declare("timed", "execution(* *Service.to_string())", Advice::around(TraceInterceptor::new()))
}

chimera_aop::register_aspect!("Audit", audit_aspect);
chimera_aop::register_aspect!("Metrics", metrics_aspect);

#[test]
fn test_static_aspects_are_collected_by_name() {
    assert_eq!(StaticAspectSource::names(), vec!["Audit", "Metrics"]);

    let aspects = StaticAspectSource::aspects().unwrap();
    assert_eq!(aspects.len(), 2);
    assert_eq!(aspects[0].name(), "Audit");

    let advisors = StaticAspectSource::advisors().unwrap();
    let names: Vec<&str> = advisors.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["audited", "timed"]);
    assert_eq!(advisors[0].order(), 10);
}

#[test]
fn test_static_aspects_drive_auto_proxy() {
    let journal = journal();
    let registry = AspectRegistry::new().with_static_aspects();
    registry.register_class(payment_class());

    let creator = AdvisorAutoProxyCreator::for_advisors(Arc::new(registry));
    let bean = creator
        .maybe_wrap(payment_service(3, &journal), "paymentService")
        .unwrap();
    let proxy = AopProxy::from_value(&bean).expect("proxied by static aspect");

    assert_eq!(advisor_names(&proxy, "charge"), vec!["audited"]);
    assert_eq!(advisor_names(&proxy, "to_string"), vec!["timed"]);

    let before = AUDITED.load(Ordering::SeqCst);
    proxy.invoke_by_name("charge", args![9u64]).unwrap();
    assert_eq!(AUDITED.load(Ordering::SeqCst), before + 1);

    assert_eq!(*proxy.call::<String>("to_string", Args::new()).unwrap(), "PaymentServiceImpl#3");
}

#[test]
fn test_registry_without_static_aspects_leaves_bean_alone() {
    let journal = journal();
    let registry = AspectRegistry::new();
    registry.register_class(payment_class());

    let creator = AdvisorAutoProxyCreator::for_advisors(Arc::new(registry));
    let bean = creator
        .maybe_wrap(payment_service(3, &journal), "paymentService")
        .unwrap();
    assert!(bean.is::<PaymentServiceImpl>());
}
