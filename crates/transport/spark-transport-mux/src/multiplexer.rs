use crate::{MuxConfig, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// 一条逻辑流：双向字节通道，承载一次请求/响应交换。
pub trait MuxStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> MuxStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// 客户端会话：在同一物理连接上按需打开逻辑流。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - `open_stream` 可被多个任务并发调用，实现方负责内部同步；
/// - `is_closed` 为存活信号：返回 `true` 表示底层连接已失效，缓存方应丢弃该会话；
/// - `peer` 返回远端地址，用于日志与错误上下文。
#[async_trait]
pub trait ClientSession: Send + Sync + 'static {
    type Stream: MuxStream;

    async fn open_stream(&self) -> Result<Self::Stream, TransportError>;

    fn is_closed(&self) -> bool;

    fn peer(&self) -> SocketAddr;
}

/// 服务端会话：持续接受入站逻辑流。
///
/// `accept_stream` 返回 `Ok(None)` 表示会话已正常结束。
#[async_trait]
pub trait ServerSession: Send + 'static {
    type Stream: MuxStream;

    async fn accept_stream(&mut self) -> Result<Option<Self::Stream>, TransportError>;

    fn peer(&self) -> SocketAddr;
}

/// 多路复用能力：把一条物理连接包装为客户端或服务端会话。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 上层只依赖此 trait，帧格式、流控与心跳细节留在实现内部；
/// - 测试可包装默认实现以统计握手次数等行为。
///
/// ## 契约 (What)
/// - `client_session`/`server_session` 接管 `conn` 的所有权；失败时物理连接随之释放；
/// - 返回的会话按 `config` 设置积压、心跳与写超时，之后不再变化。
#[async_trait]
pub trait Multiplexer: Send + Sync + 'static {
    type Client: ClientSession;
    type Server: ServerSession;

    async fn client_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Client, TransportError>;

    async fn server_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Server, TransportError>;
}
