//! 宿主 trait 定义 - 把回复和清除操作交给平台

use anyhow::Result;

use super::event::ReplyTarget;

/// 通知宿主（平台适配层）
pub trait NotificationHost: Send + Sync {
    /// 宿主名称（用于日志）
    fn name(&self) -> &str;

    /// 通过通知的回复动作发送文本
    fn send_reply(&self, notification_key: &str, target: &ReplyTarget, text: &str) -> Result<()>;

    /// 清除源通知，避免被再次处理
    fn dismiss(&self, notification_key: &str) -> Result<()>;
}
