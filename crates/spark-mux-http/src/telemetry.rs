//! 日志初始化。
//!
//! # 教案式说明
//! - **Why**：库内部只通过 `tracing` 宏输出结构化事件，订阅器由进程入口（探针二进制、基准、
//!   调用方自己的宿主）决定；本模块提供一个默认安装入口。
//! - **What**：过滤规则取自 `RUST_LOG`，未设置时为 `info`；若全局订阅器已存在则不覆盖。

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// 安装 `fmt` 订阅器；返回 `false` 表示进程内已有全局订阅器。
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
