//! 可观测性
//!
//! tracing 初始化。Gateway 审计日志（gateway_audit 事件）与执行循环的
//! warn 日志走同一套 subscriber，RUST_LOG 可按模块覆盖级别。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局 subscriber；默认 info，RUST_LOG 覆盖
pub fn init() {
    init_with_default("info");
}

/// 指定默认级别初始化
pub fn init_with_default(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
