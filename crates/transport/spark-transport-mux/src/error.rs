use std::io;
use std::time::Duration;
use thiserror::Error;

/// 传输层错误的粗粒度分类，用于区分“拨号失败”“会话失败”“单流失败”与“监听失败”。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 物理连接无法建立。
    Connect,
    /// 多路复用会话建立失败或已失效。
    Session,
    /// 单条逻辑流的打开/接受失败，不影响会话内其他流。
    Stream,
    /// 监听器绑定失败。
    Listener,
}

/// 多路复用传输错误。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 将 TCP 与多路复用层的失败统一映射为带上下文的结构化错误，调用方无需解析底层库类型；
/// - 每个变体对应一个稳定错误码（[`TransportError::code`]），便于告警与排障脚本按码聚合。
///
/// ## 契约 (What)
/// - 拨号类：`Connect`、`ConnectTimeout`，均由交换调用方直接接收，本层从不重试；
/// - 会话类：`Session`（建立失败，缓存保持为空以便下次重试）、`SessionClosed`（缓存的会话已失效）；
/// - 流类：`OpenStream`、`AcceptStream`；
/// - 监听类：`Bind`，使 `serve` 立即失败。
///
/// ## 注意事项 (Trade-offs)
/// - `tokio-yamux` 的错误类型不保证实现 `std::error::Error`，因此在边界处折叠为 `io::Error`，
///   仅保留其调试文案。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("tcp connect to `{addr}` failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("tcp connect to `{addr}` timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
    #[error("mux session setup with `{peer}` failed: {source}")]
    Session {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("mux session with `{peer}` is closed")]
    SessionClosed { peer: String },
    #[error("mux open stream to `{peer}` failed: {source}")]
    OpenStream {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("mux accept stream from `{peer}` failed: {source}")]
    AcceptStream {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("tcp bind `{addr}` failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "spark.transport.mux.connect_failed",
            Self::ConnectTimeout { .. } => "spark.transport.mux.connect_timeout",
            Self::Session { .. } => "spark.transport.mux.session_failed",
            Self::SessionClosed { .. } => "spark.transport.mux.session_closed",
            Self::OpenStream { .. } => "spark.transport.mux.open_stream_failed",
            Self::AcceptStream { .. } => "spark.transport.mux.accept_stream_failed",
            Self::Bind { .. } => "spark.transport.mux.bind_failed",
        }
    }

    /// 返回错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connect { .. } | Self::ConnectTimeout { .. } => ErrorCategory::Connect,
            Self::Session { .. } | Self::SessionClosed { .. } => ErrorCategory::Session,
            Self::OpenStream { .. } | Self::AcceptStream { .. } => ErrorCategory::Stream,
            Self::Bind { .. } => ErrorCategory::Listener,
        }
    }

    /// 将 `tokio-yamux` 的错误折叠为 `io::Error`。
    pub(crate) fn yamux_io(err: impl std::fmt::Debug) -> io::Error {
        io::Error::other(format!("{err:?}"))
    }
}
