//! 对话类型定义
//!
//! `ConversationTurn` 在生成器、传输层和历史记录之间共享。

use serde::{Deserialize, Serialize};

// ============================================================================
// Role - 发言方
// ============================================================================

/// 对话中一轮的发言方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 对方发来的消息
    Inbound,
    /// 我们生成并发出的回复
    Generated,
}

impl Role {
    /// Gemini `contents[].role` 的取值
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Inbound => "user",
            Self::Generated => "model",
        }
    }
}

// ============================================================================
// ConversationTurn - 对话轮次
// ============================================================================

/// 一轮对话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn inbound(content: impl Into<String>) -> Self {
        Self {
            role: Role::Inbound,
            content: content.into(),
        }
    }

    pub fn generated(content: impl Into<String>) -> Self {
        Self {
            role: Role::Generated,
            content: content.into(),
        }
    }
}
