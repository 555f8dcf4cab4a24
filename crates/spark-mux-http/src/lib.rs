#![doc = r#"
# spark-mux-http

## 设计动机（Why）
- **定位**：让普通的 HTTP/1 请求/响应交换运行在单条长寿、多路复用的物理连接上，
  每次交换独占一条逻辑流，从而摊薄 TCP 握手与慢启动成本，同时保留熟悉的编程模型。
- **架构角色**：位于 `spark-transport-mux` 之上，负责连接/会话生命周期：客户端的
  惰性一次性建连，服务端的接受循环与会话服务，以及协作式停机。
- **设计理念**：报文编解码完全交给 `hyper`，本 crate 只把逻辑流当作普通字节传输递给它。

## 核心契约（What）
- [`MuxClient`]：每个实例最多缓存一个存活会话；并发首调只触发一次拨号与会话建立；
  会话失效后在下一次交换时惰性重建；
- [`MuxServer`]：`serve` 绑定监听并运行接受循环，每条物理连接对应一个独立的会话服务任务；
- [`ShutdownHandle`]：电平触发的停止信号，可重复调用、从不阻塞；
- [`Handler`] / [`Router`]：应用侧请求处理入口。

## 实现策略（How）
- 会话创建由异步互斥锁串行化，锁只覆盖“复用或创建”的决策，从不跨越逻辑流 IO；
- 接受循环以固定 1 秒截止轮询监听器，超时分支检查停止信号；
- 每条入站逻辑流由 `hyper::server::conn::http1` 独立服务。

## 风险与考量（Trade-offs）
- 停机只停止接受新的物理连接，既不关闭已建立的会话，也不等待在途交换；
- 本层不做重试，所有交换级错误原样交给调用方。
"#]

mod body;
mod client;
mod config;
mod error;
mod handler;
mod server;
mod session_cache;
mod shutdown;
pub mod telemetry;

pub use body::read_response_body;
pub use client::MuxClient;
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT};
pub use error::ExchangeError;
pub use handler::{Handler, HandlerFuture, Router, not_found, text_response};
pub use server::{MuxServer, serve_session};
pub use shutdown::ShutdownHandle;
pub use spark_transport_mux::{
    ClientSession, ConfigError, ErrorCategory, MuxConfig, MuxStream, Multiplexer, ServerSession,
    TransportError, Yamux,
};
