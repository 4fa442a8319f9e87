use super::{ConfigError, ConfigResult};
use crate::engine::memory::BOOTSTRAP_OBJECTS;
use crate::macros::impl_default;
use serde::{Deserialize, Serialize};

/// 参考引擎的堆配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// 单元表的初始容量
    pub initial_capacity: usize,

    /// 存活对象上限，超出时分配抛出 RangeError
    pub max_objects: usize,

    /// 原生函数的最大重入深度
    pub max_call_depth: usize,
}

impl_default!(HeapConfig {
    initial_capacity: 256,
    max_objects: 1 << 20,
    max_call_depth: 256,
});

impl HeapConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_objects <= BOOTSTRAP_OBJECTS {
            return Err(ConfigError::ValidationError(format!(
                "max_objects must exceed the {} bootstrap objects",
                BOOTSTRAP_OBJECTS
            )));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_call_depth must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
