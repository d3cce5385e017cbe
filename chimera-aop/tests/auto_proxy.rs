mod common;

use chimera_aop::prelude::*;
use chimera_aop::{HotSwappableTargetSourceCreator, PrototypeTargetSourceCreator};
use chimera_core::prelude::*;
use common::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const CHARGE: &str = "execution(* PaymentService.charge(..))";

struct AuditLog;

fn audit_log_class() -> Arc<ClassDescriptor> {
    let interface = InterfaceDescriptor::new("AuditLog").method("append", |m| m.param("String"));
    Arc::new(
        ClassDescriptor::of::<AuditLog>()
            .implements(Arc::new(interface))
            .invoker(ReflectiveInvoker::<AuditLog>::new().method("append", |_, _| Ok(unit()))),
    )
}

fn register_security_aspect(factory: &DefaultListableBeanFactory, journal: &Journal) {
    let aspect = Aspect::new("Security").order(1).advise(
        "check",
        PointcutExpression::parse(CHARGE).unwrap(),
        recording_before(journal, "security"),
    );
    factory
        .register_instance("securityAspect", Arc::new(ClassDescriptor::of::<Aspect>()), value(aspect))
        .unwrap();
}

fn registry(factory: &Arc<DefaultListableBeanFactory>) -> Arc<dyn AdvisorRegistry> {
    Arc::new(BeanFactoryAdvisorRegistry::new(factory))
}

#[test]
fn test_matching_beans_are_proxied() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);

    let logging = Advisor::new(
        "logging",
        PointcutExpression::parse(CHARGE).unwrap(),
        recording_before(&journal, "logging"),
    )
    .with_order(2);
    factory
        .register_instance("loggingAdvisor", Arc::new(ClassDescriptor::of::<Advisor>()), value(logging))
        .unwrap();
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();
    factory
        .register_instance("auditLog", audit_log_class(), value(AuditLog))
        .unwrap();

    factory.add_bean_post_processor(Arc::new(AdvisorAutoProxyCreator::for_advisors(registry(&factory))));

    let payment = factory.get_bean("paymentService").unwrap();
    let proxy = AopProxy::from_value(&payment).expect("payment service is proxied");
    assert_eq!(proxy.target_class_name(), "PaymentServiceImpl");
    assert_eq!(advisor_names(&proxy, "charge"), vec!["check", "logging"]);

    proxy.invoke_by_name("charge", args![20u64]).unwrap();
    assert_eq!(entries(&journal), vec!["security", "logging", "target:charge"]);

    // 没有切点匹配
    assert!(factory.get_bean("auditLog").unwrap().is::<AuditLog>());
    // 顾问自身不会被代理
    assert!(factory.get_bean("securityAspect").unwrap().is::<Aspect>());
    assert!(factory.get_bean("loggingAdvisor").unwrap().is::<Advisor>());
}

#[test]
fn test_include_patterns_and_expose_invocation() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);
    for aspect_name in ["Metrics", "NotSecurity"] {
        let aspect = Aspect::new(aspect_name).advise(
            "count",
            PointcutExpression::parse(CHARGE).unwrap(),
            recording_before(&journal, aspect_name),
        );
        factory
            .register_instance(
                format!("{}Aspect", aspect_name),
                Arc::new(ClassDescriptor::of::<Aspect>()),
                value(aspect),
            )
            .unwrap();
    }
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();

    let selection = EligibleAdvisors::new()
        .with_include_patterns(["Sec.*"])
        .unwrap()
        .with_expose_invocation(true);
    factory.add_bean_post_processor(Arc::new(
        AdvisorAutoProxyCreator::for_advisors(registry(&factory)).with_selection(selection),
    ));

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    assert_eq!(advisor_names(&proxy, "charge"), vec!["exposeInvocation", "check"]);
}

#[test]
fn test_common_interceptors_first_stay_ahead_of_ordered_advisors() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);
    factory
        .register_instance(
            "tracing",
            Arc::new(ClassDescriptor::of::<Advice>()),
            value(recording_before(&journal, "tracing")),
        )
        .unwrap();
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();

    let creator = AdvisorAutoProxyCreator::for_advisors(registry(&factory))
        .with_interceptor_names(["tracing"])
        .apply_common_interceptors_first(true);
    factory.add_bean_post_processor(Arc::new(creator));

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    assert_eq!(advisor_names(&proxy, "charge"), vec!["tracing", "check"]);

    proxy.invoke_by_name("charge", args![5u64]).unwrap();
    assert_eq!(entries(&journal), vec!["tracing", "security", "target:charge"]);
}

#[test]
fn test_common_interceptors_last_ignore_their_order() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);
    let audit = Advisor::always("audit", recording_before(&journal, "audit")).with_order(HIGHEST_PRECEDENCE);
    factory
        .register_instance("auditAdvisor", Arc::new(ClassDescriptor::of::<Advisor>()), value(audit))
        .unwrap();
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();

    // "audit" 只作为公共拦截器，不参与切点选择
    let creator = AdvisorAutoProxyCreator::for_advisors(registry(&factory))
        .with_selection(EligibleAdvisors::new().with_prefix("check"))
        .with_interceptor_names(["auditAdvisor"])
        .apply_common_interceptors_first(false);
    factory.add_bean_post_processor(Arc::new(creator));

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    assert_eq!(advisor_names(&proxy, "charge"), vec!["check", "audit"]);
    assert_eq!(advisor_names(&proxy, "to_string"), vec!["audit"]);

    proxy.invoke_by_name("charge", args![5u64]).unwrap();
    assert_eq!(entries(&journal), vec!["security", "audit", "target:charge"]);
}

#[test]
fn test_hot_swappable_target_source_creator() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();

    let creator = AdvisorAutoProxyCreator::for_advisors(registry(&factory)).with_target_source_creator(Arc::new(
        HotSwappableTargetSourceCreator::new(BeanNameMatch::new(["paymentService"])),
    ));
    factory.add_bean_post_processor(Arc::new(creator));

    // 没有任何顾问，代理由目标来源创建器强制产生
    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    assert_eq!(proxy.advised().unwrap().advisor_count(), 0);
    assert_eq!(proxy.call::<Receipt>("charge", args![3u64]).unwrap().processed_by, 1);

    let advised = proxy.advised().unwrap();
    let swappable = advised
        .target_source()
        .as_any()
        .downcast_ref::<HotSwappableTargetSource>()
        .unwrap();
    let old = swappable.swap(payment_service(2, &journal)).unwrap();
    assert!(old.is::<PaymentServiceImpl>());

    assert_eq!(proxy.call::<Receipt>("charge", args![3u64]).unwrap().processed_by, 2);
    assert_eq!(entries(&journal), vec!["target:charge", "target:charge"]);
}

#[test]
fn test_bean_name_creator_applies_common_interceptors() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    factory
        .register_instance(
            "tracing",
            Arc::new(ClassDescriptor::of::<Advice>()),
            value(recording_before(&journal, "tracing")),
        )
        .unwrap();
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();
    factory
        .register_instance("auditLog", audit_log_class(), value(AuditLog))
        .unwrap();

    let creator = BeanNameAutoProxyCreator::for_bean_names(registry(&factory), BeanNameMatch::new(["payment*"]))
        .with_interceptor_names(["tracing"]);
    factory.add_bean_post_processor(Arc::new(creator));

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    assert_eq!(advisor_names(&proxy, "to_string"), vec!["tracing"]);

    proxy.invoke_by_name("to_string", Args::new()).unwrap();
    assert_eq!(entries(&journal), vec!["tracing"]);

    assert!(factory.get_bean("auditLog").unwrap().is::<AuditLog>());
    assert!(factory.get_bean("tracing").unwrap().is::<Advice>());
}

#[test]
fn test_unknown_interceptor_fails_bean_creation() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();
    factory
        .register_instance("notAnInterceptor", audit_log_class(), value(AuditLog))
        .unwrap();

    let creator = BeanNameAutoProxyCreator::for_bean_names(registry(&factory), BeanNameMatch::new(["paymentService"]))
        .with_interceptor_names(["notAnInterceptor"]);
    factory.add_bean_post_processor(Arc::new(creator));

    let err = factory.get_bean("paymentService").unwrap_err();
    match err {
        ContainerError::PostProcessingFailed { bean, processor, message } => {
            assert_eq!(bean, "paymentService");
            assert_eq!(processor, "BeanNameAutoProxyCreator");
            assert!(message.contains("notAnInterceptor"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_prototype_beans_get_fresh_target_per_call() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);

    let created = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&created);
    let bean_journal = Arc::clone(&journal);
    factory
        .register_factory("paymentService", payment_class(), Scope::Prototype, move || {
            let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(payment_service(id, &bean_journal))
        })
        .unwrap();

    let creator = AdvisorAutoProxyCreator::for_advisors(registry(&factory)).with_target_source_creator(Arc::new(
        PrototypeTargetSourceCreator::new(BeanNameMatch::new(["paymentService"])),
    ));
    factory.add_bean_post_processor(Arc::new(creator));

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    let first = proxy.call::<Receipt>("charge", args![1u64]).unwrap();
    let second = proxy.call::<Receipt>("charge", args![1u64]).unwrap();
    assert_eq!(second.processed_by, first.processed_by + 1);
}

#[test]
fn test_plugin_end_to_end() {
    let journal = journal();
    let factory = Arc::new(DefaultListableBeanFactory::new());
    register_security_aspect(&factory, &journal);
    factory
        .register_instance("paymentService", payment_class(), payment_service(1, &journal))
        .unwrap();

    let env = Environment::new().with_source(
        TomlPropertySource::parse(
            r#"
            [chimera.aop]
            expose-proxy = true
            "#,
            "application.toml",
        )
        .unwrap(),
    );
    AopPlugin::new()
        .without_static_aspects()
        .configure(&factory, &env)
        .unwrap();
    factory.preinstantiate_singletons().unwrap();

    let proxy = AopProxy::from_value(&factory.get_bean("paymentService").unwrap()).unwrap();
    let total = proxy.call::<u64>("charge_twice", args![4u64]).unwrap();
    assert_eq!(*total, 8);
    assert_eq!(
        entries(&journal),
        vec!["target:charge_twice", "security", "target:charge", "security", "target:charge"]
    );
}
