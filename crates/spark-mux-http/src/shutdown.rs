use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

/// 接受循环的协作式停止信号。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 停止请求是电平触发的标记而非一次性交接：可以重复调用，也可以在接受循环已经退出后调用，
///   任何情况下都不会阻塞调用方；
/// - 句柄可克隆，停止方无需持有服务端本身。
///
/// ## 契约 (What)
/// - `request_stop` 之后 `is_requested` 永远返回 `true`；
/// - 接受循环只在轮询超时的检查点观察该标记，因此停机延迟上限为一个轮询周期加一次在途 `accept`；
/// - 停机不关闭已建立的会话，也不等待在途交换。
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止接受新连接。
    pub fn request_stop(&self) {
        if !self.requested.swap(true, Ordering::AcqRel) {
            debug!("mux server stop requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
