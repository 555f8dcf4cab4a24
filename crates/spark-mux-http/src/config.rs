use spark_transport_mux::{ConfigError, MuxConfig};
use std::time::Duration;

/// 默认的物理连接拨号超时。
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 客户端传输配置。
///
/// - `mux`：客户端会话使用的多路复用参数；
/// - `connect_timeout`：单次物理拨号的上限，保证目标无人监听或不可达时交换以拨号错误结束而非挂起。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    mux: MuxConfig,
    connect_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn mux(&self) -> &MuxConfig {
        &self.mux
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// 替换多路复用参数；未通过 [`MuxConfig::validate`] 的配置被拒绝，原配置不变。
    pub fn with_mux(mut self, mux: MuxConfig) -> Result<Self, ConfigError> {
        mux.validate()?;
        self.mux = mux;
        Ok(self)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}
