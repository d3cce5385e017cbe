//! Bean 生命周期扩展点

use crate::bean::Bean;
use crate::error::ContainerResult;

/// Bean 后置处理器
///
/// 在 Bean 实例化之后、交给调用方之前对其进行加工，
/// 返回值会替换原始实例（例如替换为代理）。
pub trait BeanPostProcessor: Send + Sync {
    /// 初始化之前调用
    fn post_process_before_initialization(&self, bean: Bean, _bean_name: &str) -> ContainerResult<Bean> {
        Ok(bean)
    }

    /// 初始化之后调用，AOP 在这里创建代理
    fn post_process_after_initialization(&self, bean: Bean, _bean_name: &str) -> ContainerResult<Bean> {
        Ok(bean)
    }

    fn name(&self) -> &str;

    /// 执行顺序，数字越小越先执行
    fn order(&self) -> i32 {
        1000
    }
}
