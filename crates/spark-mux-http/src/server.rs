use crate::{Handler, ShutdownHandle};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use spark_transport_mux::{
    ConfigError, MuxConfig, MuxStream, Multiplexer, ServerSession, TransportError, Yamux,
    tcp::{self, ACCEPT_POLL_INTERVAL, AcceptOutcome},
};
use std::{
    convert::Infallible,
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{net::TcpStream, sync::watch};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListenState {
    Pending,
    Bound(SocketAddr),
    Failed,
}

/// 多路复用 HTTP 服务端传输。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 每条入站物理连接被包装为一个服务端会话，由独立任务服务其中的全部逻辑流；
/// - 监听器不支持快速取消，接受循环以固定截止轮询，周期性地重新获得控制权检查停止信号。
///
/// ## 逻辑 (How)
/// - **监听**：`accept` 最多阻塞 [`ACCEPT_POLL_INTERVAL`]；
/// - **会话启动**：接受成功后按配置包装会话；包装失败记录日志并丢弃物理连接；
///   成功则派生会话服务任务并立即回到监听，不等待该任务；
/// - **超时**：非阻塞地检查停止信号，已请求则以 `Ok(())` 结束；
/// - **其他接受错误**：记录日志后继续监听，从不因此终止循环。
///
/// ## 契约 (What)
/// - `serve` 仅在两种情况下返回：绑定失败（`Err(TransportError::Bind)`）或观察到停止请求（`Ok(())`）；
/// - 停机不影响已派生的会话服务任务，在途交换照常完成；
/// - 配置在构造时校验并确定，之后所有会话共用；无法建立可用会话的配置在构造阶段即被拒绝。
///
/// ## 注意事项 (Trade-offs)
/// - 停止请求在下一次轮询超时时才被观察到，延迟最长约一个轮询周期；
/// - 连续的非超时接受错误（例如文件描述符耗尽）不会使循环退出。
pub struct MuxServer<H, M = Yamux>
where
    M: Multiplexer,
{
    addr: String,
    config: MuxConfig,
    handler: Arc<H>,
    multiplexer: M,
    shutdown: ShutdownHandle,
    state: watch::Sender<ListenState>,
    sessions: Arc<AtomicUsize>,
}

impl<H: Handler> MuxServer<H, Yamux> {
    /// 以绑定地址、可选会话配置与请求处理器构造服务端；`config` 为 `None` 时使用默认值。
    ///
    /// 配置未通过 [`MuxConfig::validate`] 时返回 [`ConfigError::Invalid`]。
    pub fn new(
        addr: impl Into<String>,
        config: Option<MuxConfig>,
        handler: H,
    ) -> Result<Self, ConfigError> {
        Self::with_multiplexer(addr, config, handler, Yamux)
    }
}

impl<H: Handler, M: Multiplexer> MuxServer<H, M> {
    pub fn with_multiplexer(
        addr: impl Into<String>,
        config: Option<MuxConfig>,
        handler: H,
        multiplexer: M,
    ) -> Result<Self, ConfigError> {
        let config = config.unwrap_or_default();
        config.validate()?;
        let (state, _) = watch::channel(ListenState::Pending);
        Ok(Self {
            addr: addr.into(),
            config,
            handler: Arc::new(handler),
            multiplexer,
            shutdown: ShutdownHandle::new(),
            state,
            sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// 已绑定的实际地址；尚未绑定或绑定失败时为 `None`。
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.state.borrow() {
            ListenState::Bound(addr) => Some(addr),
            ListenState::Pending | ListenState::Failed => None,
        }
    }

    /// 等待 `serve` 完成绑定；绑定失败时返回 `None`。
    pub async fn listening(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| *state != ListenState::Pending)
            .await
            .ok()
            .map(|state| *state);
        match state {
            Some(ListenState::Bound(addr)) => Some(addr),
            _ => None,
        }
    }

    /// 返回可克隆的停止句柄。
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// 请求协作式停机：可重复调用，从不阻塞。
    pub fn close(&self) {
        self.shutdown.request_stop();
    }

    /// 正在运行的会话服务任务数量。
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }

    /// 绑定监听地址并运行接受循环，直到观察到停止请求。
    pub async fn serve(&self) -> Result<(), TransportError> {
        let listener = match tcp::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(err) => {
                self.state.send_replace(ListenState::Failed);
                return Err(err);
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(source) => {
                self.state.send_replace(ListenState::Failed);
                return Err(TransportError::Bind {
                    addr: self.addr.clone(),
                    source,
                });
            }
        };
        self.state.send_replace(ListenState::Bound(local));
        info!(addr = %local, "mux server listening");

        loop {
            match tcp::accept_within(&listener, ACCEPT_POLL_INTERVAL).await {
                AcceptOutcome::Accepted(conn, peer) => self.start_session(conn, peer).await,
                AcceptOutcome::TimedOut => {
                    if self.shutdown.is_requested() {
                        info!(addr = %local, "mux server stopped");
                        return Ok(());
                    }
                }
                AcceptOutcome::Failed(err) => {
                    warn!(addr = %local, error = %err, "mux server accept failed");
                }
            }
        }
    }

    async fn start_session(&self, conn: TcpStream, peer: SocketAddr) {
        let session = match self.multiplexer.server_session(conn, &self.config).await {
            Ok(session) => session,
            Err(err) => {
                warn!(%peer, error = %err, code = err.code(), "mux session setup failed");
                return;
            }
        };
        debug!(%peer, "mux session started");

        let handler = Arc::clone(&self.handler);
        let guard = SessionGuard::enter(&self.sessions);
        tokio::spawn(async move {
            let _guard = guard;
            serve_session(session, handler).await;
        });
    }
}

impl<H, M: Multiplexer> fmt::Debug for MuxServer<H, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxServer")
            .field("addr", &self.addr)
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .field("stop_requested", &self.shutdown.is_requested())
            .finish()
    }
}

/// 服务一个已建立的服务端会话：持续接受逻辑流并逐条交给 HTTP/1 连接服务。
///
/// 会话或其物理连接失败时静默结束，不影响接受循环与其他会话。
pub async fn serve_session<S, H>(mut session: S, handler: Arc<H>)
where
    S: ServerSession,
    H: Handler + ?Sized,
{
    let peer = session.peer();
    loop {
        match session.accept_stream().await {
            Ok(Some(stream)) => {
                tokio::spawn(serve_stream(stream, Arc::clone(&handler), peer));
            }
            Ok(None) => {
                debug!(%peer, "mux session closed");
                return;
            }
            Err(err) => {
                debug!(%peer, error = %err, "mux session failed");
                return;
            }
        }
    }
}

async fn serve_stream<T, H>(stream: T, handler: Arc<H>, peer: SocketAddr)
where
    T: MuxStream,
    H: Handler + ?Sized,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let response = handler.handle(request);
        async move { Ok::<_, Infallible>(response.await) }
    });
    if let Err(err) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(%peer, error = %err, "mux stream exchange failed");
    }
}

struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
