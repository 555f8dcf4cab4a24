#![doc = r#"
# spark-transport-mux

## 设计动机（Why）
- **定位**：在一条长寿 TCP 连接之上提供多路复用会话，客户端按需打开逻辑流，
  服务端持续接受入站逻辑流，从而摊薄握手与慢启动成本。
- **架构角色**：作为 `spark-mux-http` 的下层积木，只暴露“会话 / 逻辑流”这一窄能力，
  帧格式、流控与心跳全部交由 `tokio-yamux` 完成。
- **设计理念**：多路复用实现通过 [`Multiplexer`] trait 注入，上层只感知
  [`ClientSession`] / [`ServerSession`] 与实现了 Tokio `AsyncRead + AsyncWrite` 的流。

## 核心契约（What）
- [`MuxConfig`]：不可变的会话配置（接入积压、心跳间隔、写超时），默认 `{2048, 100ms, 250ms}`；
- [`tcp`]：物理连接的拨号、绑定与带轮询截止的 `accept`；
- [`TransportError`]：拨号、会话建立、逻辑流与监听失败的结构化错误，附稳定错误码；
- [`Yamux`]：默认的多路复用实现。

## 实现策略（How）
- 客户端会话由后台任务驱动，任务退出即翻转存活标记，供上层缓存判定是否需要重建；
- 服务端会话由调用方持有并逐个 `accept_stream`，会话结束返回 `Ok(None)`。

## 风险与考量（Trade-offs）
- 单条物理连接上的全部逻辑流共享同一心跳与写超时设置，无法按请求细化；
- 心跳间隔默认值偏激进（100ms），适合低延迟内网，跨公网部署时建议放宽。
"#]

mod config;
mod error;
mod multiplexer;
pub mod tcp;
mod yamux;

pub use config::{
    ConfigError, DEFAULT_ACCEPT_BACKLOG, DEFAULT_CONNECTION_WRITE_TIMEOUT,
    DEFAULT_KEEPALIVE_INTERVAL, MuxConfig,
};
pub use error::{ErrorCategory, TransportError};
pub use multiplexer::{ClientSession, MuxStream, Multiplexer, ServerSession};
pub use yamux::{Yamux, YamuxClientSession, YamuxServerSession};
