use spark_transport_mux::{ErrorCategory, TransportError};
use thiserror::Error;

/// 一次请求/响应交换的错误。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“拨号失败 / 会话建立失败 / 写请求失败 / 读响应失败”区分开，调用方据此决定是否换址或重发；
/// - 本层从不重试，错误总是原样交给交换的直接调用方。
///
/// ## 契约 (What)
/// - `Transport`：拨号、会话或逻辑流打开失败，细分见 [`TransportError::category`]；
/// - `InvalidRequest`：请求无法构造（方法、URI 或头部非法）；
/// - `Write`：请求写出阶段失败，包括逻辑流上的 HTTP/1 握手；
/// - `Read`：响应头或响应体读取失败。
///
/// ## 注意事项 (Trade-offs)
/// - `hyper` 只在一次调用里完成“写请求 + 读响应头”，读写边界依据错误性质推断：
///   解析失败、报文不完整与超时视为读失败，其余视为写失败。
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),
    #[error("request write failed: {0}")]
    Write(#[source] hyper::Error),
    #[error("response read failed: {0}")]
    Read(#[source] hyper::Error),
}

impl ExchangeError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.code(),
            Self::InvalidRequest(_) => "spark.mux_http.invalid_request",
            Self::Write(_) => "spark.mux_http.write_failed",
            Self::Read(_) => "spark.mux_http.read_failed",
        }
    }

    /// 物理连接无法建立时返回 `true`。
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(err) if err.category() == ErrorCategory::Connect)
    }

    pub(crate) fn from_send(err: hyper::Error) -> Self {
        if err.is_parse() || err.is_incomplete_message() || err.is_timeout() {
            Self::Read(err)
        } else {
            Self::Write(err)
        }
    }
}
