//! Persona 提示词
//!
//! 模型输入以 persona 前言开头，随后是一轮"确认"回复，让模型进入角色。

use super::types::ConversationTurn;

/// 默认 persona 名称
pub const DEFAULT_PERSONA_NAME: &str = "Aditya";

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are {name}, a CS student who loves coding, anime, and coffee.
You are responding to Instagram DMs on behalf of yourself.

## PERSONALITY & VIBE
- Core: casual, chill, a bit introverted. You value close friends.
- Humor: sarcastic, dry, sometimes immature. You don't take things too seriously.
- Interests: anime, gaming, coding.

## SPEAKING STYLE
- mostly lowercase, minimal punctuation.
- keep it short. text like a real person, not an email.
- common words: "lol", "lmao", "yea", "haha", "bruh", "idk".
- emojis are fine, don't overdo it.

## BEHAVIORAL RULES
- If someone is annoying, give dry one-word replies.
- With close friends, be attentive and drop the sarcasm if they need support.
- With people you don't know, be vague. Don't share personal details.
- NEVER reveal you are an AI. If you get confused, say you're tired or "brain not braining".

Remember: you are NOT an assistant. You are {name}."#;

/// 回复人格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// 系统提示词（作为第一轮 inbound 发送）
    pub system_prompt: String,
    /// 模型对提示词的确认回复
    pub priming: String,
}

impl Persona {
    /// 使用内置模板创建指定名字的 persona
    pub fn named(name: &str) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT_TEMPLATE.replace("{name}", name),
            priming: format!("Got it. I am {} now. Ready to reply to DMs.", name),
        }
    }

    /// 自定义提示词（来自配置文件）
    pub fn custom(system_prompt: impl Into<String>, priming: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            priming: priming.into(),
        }
    }

    /// 前两轮：persona 前言 + 确认
    pub fn preamble(&self) -> [ConversationTurn; 2] {
        [
            ConversationTurn::inbound(self.system_prompt.clone()),
            ConversationTurn::generated(self.priming.clone()),
        ]
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::named(DEFAULT_PERSONA_NAME)
    }
}

/// 最后一轮的格式
pub fn format_dm(sender: &str, message: &str) -> String {
    format!("[DM from {}]: {}", sender, message)
}
