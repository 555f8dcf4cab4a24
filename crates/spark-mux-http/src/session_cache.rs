use crate::ClientConfig;
use spark_transport_mux::{ClientSession, Multiplexer, TransportError, tcp};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::debug;

/// 客户端会话缓存：每个客户端实例至多持有一个存活会话。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 首次使用时惰性拨号并建立会话，之后所有交换复用它，摊薄握手成本；
/// - 并发首调必须只触发一次拨号，否则会留下多条无人使用的物理连接。
///
/// ## 逻辑 (How)
/// - 异步互斥锁只保护“复用或创建”的决策；锁在返回会话前释放，逻辑流的打开不被串行化；
/// - 命中的会话若已通过存活信号报告失效，则先驱逐再重建；
/// - 拨号或会话建立失败时槽位保持为空，下一次调用可以重试。
///
/// ## 契约 (What)
/// - 同一时刻至多一个建连尝试在途；
/// - `established` 统计成功建立的会话数，供观测与测试使用。
pub(crate) struct SessionCache<M: Multiplexer> {
    addr: String,
    multiplexer: M,
    config: ClientConfig,
    slot: Mutex<Option<Arc<M::Client>>>,
    established: AtomicU64,
}

impl<M: Multiplexer> SessionCache<M> {
    pub(crate) fn new(addr: String, multiplexer: M, config: ClientConfig) -> Self {
        Self {
            addr,
            multiplexer,
            config,
            slot: Mutex::new(None),
            established: AtomicU64::new(0),
        }
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    /// 返回缓存的存活会话，必要时拨号并新建。
    pub(crate) async fn ensure_session(&self) -> Result<Arc<M::Client>, TransportError> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            if !session.is_closed() {
                return Ok(Arc::clone(session));
            }
            debug!(addr = %self.addr, peer = %session.peer(), "evicting closed mux session");
            *slot = None;
        }

        let conn = tcp::connect(&self.addr, Some(self.config.connect_timeout())).await?;
        let session = Arc::new(
            self.multiplexer
                .client_session(conn, self.config.mux())
                .await?,
        );
        self.established.fetch_add(1, Ordering::Relaxed);
        debug!(addr = %self.addr, peer = %session.peer(), "mux session established");
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// 在打开逻辑流失败后调用：若失败的正是当前缓存且它已失效，则清空槽位。
    pub(crate) async fn evict_if_closed(&self, failed: &Arc<M::Client>) {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot.as_ref()
            && Arc::ptr_eq(current, failed)
            && current.is_closed()
        {
            debug!(addr = %self.addr, "evicting mux session after stream failure");
            *slot = None;
        }
    }

    pub(crate) fn established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    pub(crate) async fn has_live_session(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| !session.is_closed())
    }
}
