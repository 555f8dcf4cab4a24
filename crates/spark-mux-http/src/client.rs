use crate::{ClientConfig, ExchangeError, session_cache::SessionCache};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, Response, header::HOST};
use http_body_util::Full;
use hyper::{body::Incoming, client::conn::http1};
use hyper_util::rt::TokioIo;
use spark_transport_mux::{ClientSession, Multiplexer, TransportError, Yamux};
use std::{fmt, sync::Arc};
use tracing::debug;

/// 多路复用 HTTP 客户端传输。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 所有交换共享同一条物理连接，每次交换打开一条独立逻辑流，彼此之间没有顺序约束；
/// - 克隆只复制内部 `Arc`，并发任务可以直接持有各自的克隆。
///
/// ## 逻辑 (How)
/// - [`dial`](Self::dial)：确保会话存在后打开逻辑流，即“流拨号器”；
/// - [`send`](Self::send)：在逻辑流上完成 HTTP/1 握手，写出请求并读取响应头；
/// - [`issue`](Self::issue)：按方法、路径与头部构造空请求体的请求后调用 `send`。
///
/// ## 契约 (What)
/// - 拨号、会话建立、写入与读取失败都以 [`ExchangeError`] 直接返回，不做重试；
/// - 单条逻辑流失败不影响其他并发交换对会话的复用。
pub struct MuxClient<M: Multiplexer = Yamux> {
    cache: Arc<SessionCache<M>>,
}

impl<M: Multiplexer> Clone for MuxClient<M> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<M: Multiplexer> fmt::Debug for MuxClient<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxClient")
            .field("addr", &self.cache.addr())
            .field("sessions_established", &self.cache.established())
            .finish()
    }
}

impl MuxClient<Yamux> {
    /// 以默认配置构造客户端；首次交换时才会拨号。
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: impl Into<String>, config: ClientConfig) -> Self {
        Self::with_multiplexer(addr, config, Yamux)
    }
}

impl<M: Multiplexer> MuxClient<M> {
    pub fn with_multiplexer(addr: impl Into<String>, config: ClientConfig, multiplexer: M) -> Self {
        Self {
            cache: Arc::new(SessionCache::new(addr.into(), multiplexer, config)),
        }
    }

    /// 目标地址（`host:port`）。
    pub fn addr(&self) -> &str {
        self.cache.addr()
    }

    /// 打开一条新的逻辑流。
    pub async fn dial(&self) -> Result<<M::Client as ClientSession>::Stream, TransportError> {
        let session = self.cache.ensure_session().await?;
        match session.open_stream().await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                self.cache.evict_if_closed(&session).await;
                Err(err)
            }
        }
    }

    /// 在一条新逻辑流上执行一次交换，返回响应头与流式响应体。
    ///
    /// 请求缺少 `Host` 头时以目标地址补齐。
    pub async fn send(
        &self,
        mut request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, ExchangeError> {
        if !request.headers().contains_key(HOST) {
            let host = HeaderValue::from_str(self.addr()).map_err(http::Error::from)?;
            request.headers_mut().insert(HOST, host);
        }

        let stream = self.dial().await?;
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ExchangeError::Write)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(error = %err, "mux exchange connection ended with error");
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(ExchangeError::from_send)
    }

    /// 便捷交换：`uri` 为目标路径（可带查询串），`headers` 中每个值都会追加到请求上。
    ///
    /// `Host` 头始终取自目标地址，传入的同名头被忽略。
    pub async fn issue(
        &self,
        method: Method,
        uri: &str,
        headers: &HeaderMap,
    ) -> Result<Response<Incoming>, ExchangeError> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))?;
        for (name, value) in headers {
            if *name == HOST {
                continue;
            }
            request.headers_mut().append(name.clone(), value.clone());
        }
        self.send(request).await
    }

    /// 成功建立过的会话数量。
    pub fn sessions_established(&self) -> u64 {
        self.cache.established()
    }

    /// 当前是否缓存着存活会话。
    pub async fn has_live_session(&self) -> bool {
        self.cache.has_live_session().await
    }
}
