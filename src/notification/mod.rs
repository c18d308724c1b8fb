//! 通知处理 - 从平台通知到自动回复
//!
//! # 流程
//! 1. `NotificationBridge::handle` 过滤应用包名、空字段、分组摘要
//! 2. `InboundMessageGate` 判断自回声/重复/冷却
//! 3. 放行后在独立任务中调用 `ReplyGenerator`
//! 4. 通过 `NotificationHost` 回复并清除源通知
//!
//! # 使用示例
//! ```ignore
//! use pim_responder::notification::{InboundMessageGate, NotificationBridge};
//!
//! let bridge = NotificationBridge::new(gate, generator, history, host);
//! bridge.handle(&notification);
//! ```

pub mod bounded;
pub mod bridge;
pub mod clock;
pub mod event;
pub mod gate;
pub mod host;

pub use bounded::BoundedSet;
pub use bridge::{HandleOutcome, IgnoreReason, NotificationBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{
    InboundEvent, NotificationAction, PlatformNotification, RemoteInput, ReplyTarget,
    INSTAGRAM_PACKAGE,
};
pub use gate::{DropReason, GateConfig, GateDecision, GateSnapshot, GateState, InboundMessageGate};
pub use host::NotificationHost;
