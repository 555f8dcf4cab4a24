use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 默认的接入积压：会话最多缓冲 2048 条尚未被接受的入站逻辑流。
pub const DEFAULT_ACCEPT_BACKLOG: usize = 2048;
/// 默认心跳间隔。
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(100);
/// 默认的物理连接写超时。
pub const DEFAULT_CONNECTION_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// 多路复用会话配置。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 服务端在构造时一次性确定会话参数，此后所有会话共享同一份配置；
/// - 字段私有、仅提供消费式 `with_*` 构造方法，交出去的值不会再被修改。
///
/// ## 契约 (What)
/// - `accept_backlog`：未被接受的入站逻辑流缓冲上限，必须大于 0；
/// - `keepalive_interval`：心跳间隔，必须大于 0；
/// - `connection_write_timeout`：物理连接写超时，必须大于 0；
/// - TOML 表示中两个时长以毫秒整数给出（`*_ms` 键），缺省键回落到默认值，未知键报错。
///
/// ## 注意事项 (Trade-offs)
/// - 配置作用于整条物理连接，无法为单个请求设置超时。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuxConfig {
    accept_backlog: usize,
    #[serde(rename = "keepalive_interval_ms", with = "duration_ms")]
    keepalive_interval: Duration,
    #[serde(rename = "connection_write_timeout_ms", with = "duration_ms")]
    connection_write_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            accept_backlog: DEFAULT_ACCEPT_BACKLOG,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            connection_write_timeout: DEFAULT_CONNECTION_WRITE_TIMEOUT,
        }
    }
}

impl MuxConfig {
    /// 返回接入积压上限。
    pub fn accept_backlog(&self) -> usize {
        self.accept_backlog
    }

    /// 返回心跳间隔。
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// 返回物理连接写超时。
    pub fn connection_write_timeout(&self) -> Duration {
        self.connection_write_timeout
    }

    pub fn with_accept_backlog(mut self, backlog: usize) -> Self {
        self.accept_backlog = backlog;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_connection_write_timeout(mut self, timeout: Duration) -> Self {
        self.connection_write_timeout = timeout;
        self
    }

    /// 校验配置是否可用于建立会话。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accept_backlog == 0 {
            return Err(ConfigError::Invalid {
                field: "accept_backlog",
                reason: "must be greater than zero",
            });
        }
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "keepalive_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.connection_write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "connection_write_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// 从 TOML 文本解析并校验配置。
    ///
    /// ```
    /// use spark_transport_mux::MuxConfig;
    ///
    /// let config = MuxConfig::from_toml_str("accept_backlog = 64").unwrap();
    /// assert_eq!(config.accept_backlog(), 64);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 转换为 `tokio-yamux` 的会话配置，心跳始终开启。
    pub(crate) fn to_yamux(self) -> tokio_yamux::config::Config {
        tokio_yamux::config::Config {
            accept_backlog: self.accept_backlog,
            enable_keepalive: true,
            keepalive_interval: self.keepalive_interval,
            connection_write_timeout: self.connection_write_timeout,
            ..tokio_yamux::config::Config::default()
        }
    }
}

/// 配置解析与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mux config parse failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("mux config field `{field}` {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer, ser::Error};
    use std::time::Duration;

    pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom("duration exceeds u64 milliseconds"))?;
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
