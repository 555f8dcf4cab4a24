//! 集成测试共用的服务端装配与计数用多路复用器。
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use spark_mux_http::{
    ClientSession, Handler, MuxConfig, MuxServer, Multiplexer, Router, TransportError, Yamux,
    text_response,
};
use spark_transport_mux::{YamuxClientSession, YamuxServerSession};
use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpStream, task::JoinHandle};

type YamuxStream = <YamuxClientSession as ClientSession>::Stream;

pub const WELCOME: &str = "Welcome to the home page!";

/// `/cenas` 返回欢迎页，`/echo-header` 回显 `x-probe` 头，`/echo` 回显请求体。
pub fn test_router() -> Router {
    Router::new()
        .route("/cenas", |_request: Request<Incoming>| async {
            text_response(StatusCode::OK, WELCOME)
        })
        .route("/echo-header", |request: Request<Incoming>| async move {
            let probe = request
                .headers()
                .get_all("x-probe")
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            text_response(StatusCode::OK, probe)
        })
        .route("/echo", |request: Request<Incoming>| async move {
            match request.into_body().collect().await {
                Ok(body) => text_response(StatusCode::OK, body.to_bytes()),
                Err(_) => text_response(StatusCode::BAD_REQUEST, Bytes::new()),
            }
        })
}

/// 已启动的服务端及其接受循环任务。
pub struct Running<H: Handler, M: Multiplexer = Yamux> {
    pub server: Arc<MuxServer<H, M>>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), TransportError>>,
}

pub async fn start<H: Handler, M: Multiplexer>(server: MuxServer<H, M>) -> Running<H, M> {
    let server = Arc::new(server);
    let serving = Arc::clone(&server);
    let task = tokio::spawn(async move { serving.serve().await });
    let addr = server.listening().await.expect("测试服务端绑定失败");
    Running { server, addr, task }
}

pub async fn start_default() -> Running<Router> {
    start(MuxServer::new("127.0.0.1:0", None, test_router()).expect("默认配置必须合法")).await
}

/// 统计会话建立次数的多路复用器。
///
/// 可选地拖慢客户端会话建立、拒绝首次客户端或服务端会话包装，
/// 或让客户端会话的下一次 `open_stream` 失败。
#[derive(Clone, Default)]
pub struct CountingYamux {
    pub sessions: Arc<AtomicUsize>,
    pub rejected: Arc<AtomicUsize>,
    pub reject_first_client: Arc<AtomicBool>,
    pub reject_first_server: Arc<AtomicBool>,
    pub fail_next_stream: Arc<AtomicBool>,
    pub setup_delay: Duration,
}

impl CountingYamux {
    pub fn count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn refuse(&self, flag: &AtomicBool, conn: &TcpStream) -> Option<TransportError> {
        if !flag.swap(false, Ordering::SeqCst) {
            return None;
        }
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Some(TransportError::Session {
            peer: conn
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
            source: io::Error::other("handshake rejected"),
        })
    }
}

/// 包装 yamux 客户端会话，按共享标记让单次 `open_stream` 失败。
pub struct FlakyClientSession {
    inner: YamuxClientSession,
    fail_next_stream: Arc<AtomicBool>,
}

#[async_trait]
impl ClientSession for FlakyClientSession {
    type Stream = YamuxStream;

    async fn open_stream(&self) -> Result<YamuxStream, TransportError> {
        if self.fail_next_stream.swap(false, Ordering::SeqCst) {
            return Err(TransportError::OpenStream {
                peer: self.inner.peer().to_string(),
                source: io::Error::other("stream refused"),
            });
        }
        self.inner.open_stream().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn peer(&self) -> SocketAddr {
        self.inner.peer()
    }
}

#[async_trait]
impl Multiplexer for CountingYamux {
    type Client = FlakyClientSession;
    type Server = YamuxServerSession;

    async fn client_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Client, TransportError> {
        if !self.setup_delay.is_zero() {
            tokio::time::sleep(self.setup_delay).await;
        }
        if let Some(err) = self.refuse(&self.reject_first_client, &conn) {
            return Err(err);
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyClientSession {
            inner: Yamux.client_session(conn, config).await?,
            fail_next_stream: Arc::clone(&self.fail_next_stream),
        })
    }

    async fn server_session(
        &self,
        conn: TcpStream,
        config: &MuxConfig,
    ) -> Result<Self::Server, TransportError> {
        if let Some(err) = self.refuse(&self.reject_first_server, &conn) {
            return Err(err);
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Yamux.server_session(conn, config).await
    }
}

/// 在 `limit` 内轮询等待 `probe` 成立。
pub async fn eventually<F, Fut>(limit: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let step = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    loop {
        if probe().await {
            return true;
        }
        if waited >= limit {
            return false;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
}
