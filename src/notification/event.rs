//! 平台通知事件
//!
//! `PlatformNotification` 是宿主（Android 通知监听服务等）推送过来的原始通知，
//! `InboundEvent` 是从中提取出的一条私信。

use serde::{Deserialize, Serialize};

/// 默认监听的应用包名
pub const INSTAGRAM_PACKAGE: &str = "com.instagram.android";

/// 通知动作上的输入框
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInput {
    /// 回复文本写入的结果键
    pub result_key: String,
    /// 是否允许自由文本
    #[serde(default)]
    pub allow_free_form: bool,
}

/// 通知上的动作按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub inputs: Vec<RemoteInput>,
}

/// 平台通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformNotification {
    /// 通知唯一键（用于回复和清除）
    pub key: String,
    /// 来源应用包名
    pub package: String,
    /// 标题（发送者显示名）
    #[serde(default)]
    pub title: Option<String>,
    /// 正文（消息内容）
    #[serde(default)]
    pub text: Option<String>,
    /// 是否为分组摘要通知
    #[serde(default)]
    pub group_summary: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

/// 找到的回复入口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    /// 动作在 `actions` 中的下标
    pub action_index: usize,
    pub action_title: String,
    pub result_key: String,
}

impl PlatformNotification {
    /// 找到第一个支持自由文本输入的动作
    pub fn find_reply_action(&self) -> Option<ReplyTarget> {
        self.actions
            .iter()
            .enumerate()
            .find_map(|(action_index, action)| {
                action
                    .inputs
                    .iter()
                    .find(|input| input.allow_free_form)
                    .map(|input| ReplyTarget {
                        action_index,
                        action_title: action.title.clone(),
                        result_key: input.result_key.clone(),
                    })
            })
    }

    /// 提取发送者和消息；任一缺失或为空白时返回 None
    pub fn sender_and_message(&self) -> Option<(&str, &str)> {
        let sender = self.title.as_deref().filter(|s| !s.trim().is_empty())?;
        let message = self.text.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((sender, message))
    }
}

/// 一条入站私信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: String,
    pub message: String,
    pub observed_at_ms: u64,
}
