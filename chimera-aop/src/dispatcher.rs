//! 调用分发
//!
//! 代理上的每次调用都经过这里：身份方法和管理接口在本地处理，
//! 其余方法取目标、取链，再执行链（空链直接调用目标）。

use crate::advice::{Advice, AdviceType};
use crate::advisor::Advisor;
use crate::chain::InterceptorChain;
use crate::context::AopContext;
use crate::error::AopConfigError;
use crate::joinpoint::MethodInvocation;
use crate::proxy::{meta, AopProxy, ProxyStrategy};
use crate::target_source::TargetSource;
use chimera_core::reflect::{same_object, unit, value, Args, ClassDescriptor, MethodDescriptor, ReturnType, Value};
use std::sync::Arc;

/// 调用真正的目标方法
pub(crate) fn invoke_target(
    class: &ClassDescriptor,
    target: Option<&Value>,
    method: &MethodDescriptor,
    args: &Args,
) -> anyhow::Result<Value> {
    let target = target.ok_or_else(|| AopConfigError::NoTarget {
        method: method.signature(),
    })?;
    let invoker = class
        .method_invoker()
        .ok_or_else(|| AopConfigError::NoMethodInvoker {
            class: class.name().to_string(),
        })?;
    invoker.invoke(target, method, args)
}

pub struct InvocationDispatcher;

impl InvocationDispatcher {
    pub fn invoke(proxy: &Arc<AopProxy>, method: &MethodDescriptor, args: Args) -> anyhow::Result<Value> {
        match method.declaring_type() {
            meta::OBJECT => return Self::invoke_object_method(proxy, method, &args),
            meta::ADVISED => return Self::invoke_advised_method(proxy, method, &args),
            _ => {}
        }

        let advised = proxy.advised_unchecked();
        if !advised.is_interface_proxied(method.declaring_type()) {
            return Err(AopConfigError::NoSuchMethod {
                method: method.signature(),
            }
            .into());
        }

        let _exposure = advised.is_expose_proxy().then(|| AopContext::expose(proxy));

        let (target, chain) = match &proxy.strategy {
            ProxyStrategy::Optimized {
                target,
                fixed_chains,
            } => {
                let chain = match fixed_chains.as_ref().and_then(|c| c.get(method)) {
                    Some(chain) => Arc::clone(chain),
                    None => advised.chain_for(method)?,
                };
                (target.clone(), chain)
            }
            ProxyStrategy::Dynamic => {
                let target = advised.target_source().get_target()?;
                let chain = match advised.chain_for(method) {
                    Ok(chain) => chain,
                    Err(e) => {
                        Self::release(advised.target_source().as_ref(), target.as_ref())?;
                        return Err(e.into());
                    }
                };
                (target, chain)
            }
        };

        let class = advised.target_class();
        let result = match chain.as_ref() {
            InterceptorChain::Empty => {
                tracing::trace!("No advice for {}, invoking target directly", method.signature());
                invoke_target(class, target.as_ref(), method, &args)
            }
            InterceptorChain::Advised(advisors) => {
                MethodInvocation::new(proxy, target.clone(), class, method, args, advisors).proceed()
            }
        };

        let result = result.map(|r| Self::rewrite_self_reference(proxy, target.as_ref(), method, r));

        if let Err(release_error) = Self::release(advised.target_source().as_ref(), target.as_ref()) {
            return match result {
                Ok(_) => Err(release_error),
                Err(e) => {
                    tracing::warn!("Failed to release target after error: {:#}", release_error);
                    Err(e)
                }
            };
        }

        result
    }

    fn release(source: &dyn TargetSource, target: Option<&Value>) -> anyhow::Result<()> {
        match target {
            Some(target) if !source.is_static() => source.release_target(target),
            _ => Ok(()),
        }
    }

    /// 目标返回自身时，把返回值替换为代理，前提是声明的返回类型允许
    fn rewrite_self_reference(
        proxy: &Arc<AopProxy>,
        target: Option<&Value>,
        method: &MethodDescriptor,
        result: Value,
    ) -> Value {
        let Some(target) = target else {
            return result;
        };
        if !same_object(&result, target) {
            return result;
        }

        let compatible = match method.return_type() {
            ReturnType::Any => true,
            ReturnType::Interface(name) => proxy.implements(name),
            ReturnType::Unit | ReturnType::Value(_) => false,
        };
        if compatible {
            tracing::trace!("Replacing returned target with proxy for {}", method.signature());
            proxy.as_value()
        } else {
            result
        }
    }

    fn invoke_object_method(proxy: &Arc<AopProxy>, method: &MethodDescriptor, args: &Args) -> anyhow::Result<Value> {
        match method.name() {
            "equals" => {
                let other = args.value(0)?;
                let equal = AopProxy::from_value(other).is_some_and(|other| **proxy == *other);
                Ok(value(equal))
            }
            "hash_code" => Ok(value(proxy.hash_code())),
            _ => Err(AopConfigError::NoSuchMethod {
                method: method.signature(),
            }
            .into()),
        }
    }

    fn invoke_advised_method(proxy: &Arc<AopProxy>, method: &MethodDescriptor, args: &Args) -> anyhow::Result<Value> {
        let advised = proxy.advised().map_err(|_| AopConfigError::OpaqueProxy {
            method: method.name().to_string(),
        })?;

        let advisor_arg = |index: usize| -> anyhow::Result<Arc<Advisor>> {
            Ok(Arc::clone(args.get::<Arc<Advisor>>(index)?))
        };

        let result = match method.name() {
            "advisors" => value(advised.advisors().to_vec()),
            "proxied_interfaces" => value(
                advised
                    .proxied_interfaces()
                    .iter()
                    .map(|i| i.name().to_string())
                    .collect::<Vec<_>>(),
            ),
            "is_interface_proxied" => value(advised.is_interface_proxied(args.get::<String>(0)?)),
            "target_source" => value(Arc::clone(advised.target_source())),
            "is_frozen" => value(advised.is_frozen()),
            "is_expose_proxy" => value(advised.is_expose_proxy()),
            "add_advisor" => {
                advised.add_advisor(advisor_arg(0)?)?;
                unit()
            }
            "add_advisor_at" => {
                advised.add_advisor_at(*args.get::<usize>(0)?, advisor_arg(1)?)?;
                unit()
            }
            "remove_advisor" => value(advised.remove_advisor(&*advisor_arg(0)?)?),
            "remove_advisor_at" => value(advised.remove_advisor_at(*args.get::<usize>(0)?)?),
            "replace_advisor" => value(advised.replace_advisor(&*advisor_arg(0)?, advisor_arg(1)?)?),
            "index_of" => value(advised.index_of(&*advisor_arg(0)?)),
            "add_advice" => {
                advised.add_advice(args.get::<Advice>(0)?.clone())?;
                unit()
            }
            "count_advice_of_kind" => value(advised.count_advice_of_kind(*args.get::<AdviceType>(0)?)),
            "to_proxy_config_string" => value(advised.to_proxy_config_string()),
            _ => {
                return Err(AopConfigError::NoSuchMethod {
                    method: method.signature(),
                }
                .into())
            }
        };
        Ok(result)
    }
}
