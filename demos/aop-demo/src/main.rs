use chimera_aop::prelude::*;
use chimera_aop::{ExceptionLoggingAdvice, PerformanceMonitorInterceptor, TraceInterceptor};
use chimera_core::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const APPLICATION_TOML: &str = r#"
[logging]
level = "info"

[chimera.aop]
expose-proxy = true
bean-names = ["inventory*"]
interceptor-names = ["tracing"]
"#;

// ==================== 业务服务 ====================

#[derive(Debug, Clone)]
struct Order {
    id: u64,
    item: String,
    quantity: u32,
}

struct OrderServiceImpl {
    next_id: AtomicU64,
}

fn order_class() -> Arc<ClassDescriptor> {
    let interface = InterfaceDescriptor::new("OrderService")
        .method("place_order", |m| {
            m.param("String")
                .param("u32")
                .returns(ReturnType::Value("Order".into()))
        })
        .method("place_bulk", |m| m.param("String").returns(ReturnType::Value("u64".into())))
        .method("cancel", |m| m.param("u64"));

    let invoker = ReflectiveInvoker::<OrderServiceImpl>::new()
        .method("place_order", |svc, args| {
            let item = args.get::<String>(0)?.clone();
            let quantity = *args.get::<u32>(1)?;
            let id = svc.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(value(Order { id, item, quantity }))
        })
        .method("place_bulk", |_, args| {
            let item = args.get::<String>(0)?.clone();
            // 经由代理调用自身，通知同样生效
            let proxy = AopContext::current_proxy()?;
            let first = proxy.call::<Order>("place_order", args![item.clone(), 10u32])?;
            let second = proxy.call::<Order>("place_order", args![item, 20u32])?;
            Ok(value(u64::from(first.quantity + second.quantity)))
        })
        .method("cancel", |_, args| {
            let id = *args.get::<u64>(0)?;
            anyhow::bail!("order {} has already shipped", id)
        });

    Arc::new(
        ClassDescriptor::of::<OrderServiceImpl>()
            .implements(Arc::new(interface))
            .invoker(invoker),
    )
}

struct InventoryServiceImpl;

fn inventory_class() -> Arc<ClassDescriptor> {
    let interface = InterfaceDescriptor::new("InventoryService")
        .method("stock", |m| m.param("String").returns(ReturnType::Value("u32".into())));
    let invoker = ReflectiveInvoker::<InventoryServiceImpl>::new().method("stock", |_, args| {
        let item = args.get::<String>(0)?;
        Ok(value(if item == "keyboard" { 42u32 } else { 0u32 }))
    });

    Arc::new(
        ClassDescriptor::of::<InventoryServiceImpl>()
            .implements(Arc::new(interface))
            .invoker(invoker),
    )
}

// ==================== 切面 ====================

fn security_aspect() -> anyhow::Result<Aspect> {
    Ok(Aspect::new("Security")
        .order(1)
        .before("checkQuantity", "execution(* OrderService.place_order(..))", |inv| {
            let quantity = *inv.args().get::<u32>(1)?;
            anyhow::ensure!(quantity > 0, "quantity must be positive");
            Ok(())
        })?)
}

fn transaction_aspect() -> anyhow::Result<Aspect> {
    Ok(Aspect::new("Tx")
        .order(5)
        .around("transactional", "execution(* OrderService.*(..))", |inv| {
            tracing::info!("BEGIN {}", inv.signature());
            inv.proceed()
        })?
        .after_returning("commit", "execution(* OrderService.*(..))", |inv, _| {
            tracing::info!("COMMIT {}", inv.signature());
            Ok(())
        })?
        .after_throwing("rollback", "execution(* OrderService.*(..))", |inv, error| {
            tracing::warn!("ROLLBACK {}: {}", inv.signature(), error);
            Ok(())
        })?)
}

fn metrics_aspect() -> AopResult<Aspect> {
    Aspect::new("Metrics").declare(
        "slowCalls",
        "execution(* *Service.*(..))",
        Advice::around(PerformanceMonitorInterceptor::new(Duration::from_millis(50))),
    )
}

chimera_aop::register_aspect!("Metrics", metrics_aspect);

fn main() -> anyhow::Result<()> {
    let env = Environment::new()
        .with_source(TomlPropertySource::parse(APPLICATION_TOML, "application.toml")?)
        .with_source(EnvironmentPropertySource::new("APP_"));
    LoggingConfig::from_environment(&env).init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║              Chimera AOP Demo                      ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let factory = Arc::new(DefaultListableBeanFactory::new());
    factory.register_instance(
        "securityAspect",
        Arc::new(ClassDescriptor::of::<Aspect>()),
        value(security_aspect()?),
    )?;
    factory.register_instance(
        "transactionAspect",
        Arc::new(ClassDescriptor::of::<Aspect>()),
        value(transaction_aspect()?),
    )?;
    factory.register_instance(
        "exceptionLogging",
        Arc::new(ClassDescriptor::of::<Advisor>()),
        value(Advisor::new(
            "exceptionLogging",
            PointcutExpression::parse("execution(* *Service.*(..))")?,
            Advice::after_throwing(ExceptionLoggingAdvice::new()),
        )),
    )?;
    factory.register_instance(
        "tracing",
        Arc::new(ClassDescriptor::of::<Advice>()),
        value(Advice::around(TraceInterceptor::new().with_args())),
    )?;
    factory.register_instance(
        "orderService",
        order_class(),
        value(OrderServiceImpl {
            next_id: AtomicU64::new(1),
        }),
    )?;
    factory.register_instance("inventoryService", inventory_class(), value(InventoryServiceImpl))?;

    let registered = AopPlugin::new().configure(&factory, &env)?;
    tracing::info!("AOP plugin registered {} auto-proxy creator(s)", registered);
    factory.preinstantiate_singletons()?;

    let orders = AopProxy::from_value(&factory.get_bean("orderService")?)
        .ok_or_else(|| anyhow!("orderService was not proxied"))?;
    println!("📦 orderService chain for place_order:");
    if let Some(method) = orders.find_method("place_order") {
        for name in orders.advised()?.chain_for(&method)?.names() {
            println!("   - {}", name);
        }
    }

    let order = orders.call::<Order>("place_order", args!["keyboard".to_string(), 2u32])?;
    println!("\n✅ Placed order #{}: {} x {}", order.id, order.quantity, order.item);

    let total = orders.call::<u64>("place_bulk", args!["mouse".to_string()])?;
    println!("✅ Bulk order placed, {} units in total", total);

    if let Err(e) = orders.invoke_by_name("place_order", args!["monitor".to_string(), 0u32]) {
        println!("❌ Rejected: {}", e);
    }
    if let Err(e) = orders.invoke_by_name("cancel", args![order.id]) {
        println!("❌ Cancel failed: {}", e);
    }

    let inventory = AopProxy::from_value(&factory.get_bean("inventoryService")?)
        .ok_or_else(|| anyhow!("inventoryService was not proxied"))?;
    let stock = inventory.call::<u32>("stock", args!["keyboard".to_string()])?;
    println!("\n🗄️  Keyboards in stock: {}", stock);

    println!("\n🔧 {}", orders.advised()?.to_proxy_config_string());
    println!("\n💡 Try: APP_CHIMERA_AOP_EXPOSE_PROXY=false cargo run -p aop-demo");
    Ok(())
}
