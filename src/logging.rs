//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 配置tracing日志框架。`RUST_LOG` 存在时优先使用它，否则使用配置中的级别。
/// 重复初始化是无害的，返回 `false` 表示已有全局订阅者。
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(target: "script_bridge", level = config.level.as_str(), "Logging initialized");
    }
    installed
}
