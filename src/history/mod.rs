//! 对话历史 - 为生成器提供每个发送者的历史轮次
//!
//! 生成器只读取历史；回复发出后由桥接层追加本轮的入站消息和生成的回复。

pub mod memory;
pub mod store;

use anyhow::Result;

use crate::ai::ConversationTurn;

pub use memory::MemoryHistory;
pub use store::{HistoryRecord, JsonlHistory};

/// 每个发送者默认保留/提供的历史轮数
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// 历史记录提供者
pub trait HistoryProvider: Send + Sync {
    /// 按时间顺序返回该发送者最近的历史
    fn history(&self, sender: &str) -> Result<Vec<ConversationTurn>>;

    /// 追加若干轮
    fn record(&self, sender: &str, turns: &[ConversationTurn]) -> Result<()>;
}
