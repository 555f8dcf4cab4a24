//! 物理连接层：拨号、绑定与带轮询截止的 `accept`。
//!
//! # 教案式说明
//! - **Why**：监听器本身不支持快速取消，接受循环需要周期性地重新获得控制权以检查停止信号；
//!   [`accept_within`] 用固定截止时间包裹一次 `accept`，把“超时”变成可预期的控制流分支。
//! - **What**：超时不是错误，以 [`AcceptOutcome::TimedOut`] 返回；其余失败以
//!   [`AcceptOutcome::Failed`] 返回，交由调用方记录后继续监听。
//! - **Trade-offs**：停止信号的观测延迟上限为一个轮询周期（[`ACCEPT_POLL_INTERVAL`]）。

use crate::TransportError;
use socket2::SockRef;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// 单次 `accept` 的轮询截止时长。
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 一次带截止的 `accept` 的结果。
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(TcpStream, SocketAddr),
    TimedOut,
    Failed(io::Error),
}

/// 拨号到 `addr`，可选地以 `timeout` 限定建连时长。
pub async fn connect(addr: &str, timeout: Option<Duration>) -> Result<TcpStream, TransportError> {
    let dial = TcpStream::connect(addr);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, dial).await {
            Ok(result) => result,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr: addr.to_owned(),
                    timeout: limit,
                });
            }
        },
        None => dial.await,
    };
    result.map_err(|source| TransportError::Connect {
        addr: addr.to_owned(),
        source,
    })
}

/// 绑定监听地址。
pub async fn bind(addr: &str) -> Result<TcpListener, TransportError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_owned(),
            source,
        })
}

/// 在 `poll` 时长内等待一个入站连接。
pub async fn accept_within(listener: &TcpListener, poll: Duration) -> AcceptOutcome {
    match tokio::time::timeout(poll, listener.accept()).await {
        Ok(Ok((conn, peer))) => AcceptOutcome::Accepted(conn, peer),
        Ok(Err(err)) if err.kind() == io::ErrorKind::TimedOut => AcceptOutcome::TimedOut,
        Ok(Err(err)) => AcceptOutcome::Failed(err),
        Err(_) => AcceptOutcome::TimedOut,
    }
}

/// 为承载多路复用会话的连接设置 `TCP_NODELAY` 与 `SO_KEEPALIVE`。
pub(crate) fn tune(conn: &TcpStream) -> io::Result<()> {
    let sock = SockRef::from(conn);
    sock.set_tcp_nodelay(true)?;
    sock.set_keepalive(true)
}
