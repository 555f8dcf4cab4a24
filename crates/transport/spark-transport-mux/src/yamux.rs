use crate::{
    ClientSession, MuxConfig, Multiplexer, ServerSession, TransportError,
    tcp::tune,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{net::TcpStream, sync::oneshot};
use tokio_yamux::{Control, session::Session, stream::StreamHandle};
use tracing::debug;

/// 基于 `tokio-yamux` 的默认多路复用实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct Yamux;

/// yamux 客户端会话句柄。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - yamux 会话必须被持续轮询才能推进帧收发，因此由后台驱动任务独占 `Session`，
///   句柄只保留可克隆的 `Control`；
/// - 驱动任务退出（连接关闭、心跳失败）时翻转 `closed`，上层缓存据此驱逐失效会话。
///
/// ## 契约 (What)
/// - `open_stream` 可并发调用；会话已失效时直接返回 [`TransportError::SessionClosed`]；
/// - 句柄被丢弃时通知驱动任务退出，物理连接随之关闭。
pub struct YamuxClientSession {
    control: Control,
    closed: Arc<AtomicBool>,
    peer: SocketAddr,
    _stop: oneshot::Sender<()>,
}

impl fmt::Debug for YamuxClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YamuxClientSession")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// yamux 服务端会话，由会话服务任务独占并逐个接受入站流。
pub struct YamuxServerSession {
    session: Session<TcpStream>,
    peer: SocketAddr,
}

#[async_trait]
impl Multiplexer for Yamux {
    type Client = YamuxClientSession;
    type Server = YamuxServerSession;

    async fn client_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Client, TransportError> {
        let peer = prepare(&conn)?;
        let session = Session::new_client(conn, config.to_yamux());
        let control = session.control();
        let closed = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(drive_client(session, Arc::clone(&closed), stop_rx, peer));
        Ok(YamuxClientSession {
            control,
            closed,
            peer,
            _stop: stop_tx,
        })
    }

    async fn server_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Server, TransportError> {
        let peer = prepare(&conn)?;
        Ok(YamuxServerSession {
            session: Session::new_server(conn, config.to_yamux()),
            peer,
        })
    }
}

fn prepare(conn: &TcpStream) -> Result<SocketAddr, TransportError> {
    let peer = conn.peer_addr().map_err(|source| TransportError::Session {
        peer: "<unknown>".to_owned(),
        source,
    })?;
    tune(conn).map_err(|source| TransportError::Session {
        peer: peer.to_string(),
        source,
    })?;
    Ok(peer)
}

async fn drive_client(
    mut session: Session<TcpStream>,
    closed: Arc<AtomicBool>,
    mut stop: oneshot::Receiver<()>,
    peer: SocketAddr,
) {
    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(%peer, "client session handle dropped, closing");
                break;
            }
            inbound = session.next() => match inbound {
                Some(Ok(stream)) => {
                    debug!(%peer, "dropping unexpected inbound stream on client session");
                    drop(stream);
                }
                Some(Err(err)) => {
                    debug!(%peer, error = %err, "client session failed");
                    break;
                }
                None => {
                    debug!(%peer, "client session ended");
                    break;
                }
            },
        }
    }
    closed.store(true, Ordering::Release);
}

#[async_trait]
impl ClientSession for YamuxClientSession {
    type Stream = StreamHandle;

    async fn open_stream(&self) -> Result<StreamHandle, TransportError> {
        if self.is_closed() {
            return Err(TransportError::SessionClosed {
                peer: self.peer.to_string(),
            });
        }
        let mut control = self.control.clone();
        control
            .open_stream()
            .await
            .map_err(|err| TransportError::OpenStream {
                peer: self.peer.to_string(),
                source: TransportError::yamux_io(err),
            })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl ServerSession for YamuxServerSession {
    type Stream = StreamHandle;

    async fn accept_stream(&mut self) -> Result<Option<StreamHandle>, TransportError> {
        match self.session.next().await {
            Some(Ok(stream)) => Ok(Some(stream)),
            Some(Err(source)) => Err(TransportError::AcceptStream {
                peer: self.peer.to_string(),
                source,
            }),
            None => Ok(None),
        }
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }
}
