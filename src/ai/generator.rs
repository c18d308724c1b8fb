//! 回复生成器 - 带凭证轮换的重试循环
//!
//! ## 重试策略
//! 1. 每次调用最多尝试 `pool.len()` 次，每个凭证一次
//! 2. 任何失败（包括超时和空响应）都会轮换到下一个凭证
//! 3. 全部失败时返回 `GenerationExhaustedError`，携带最后一次错误

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::{GenerationTransport, DEFAULT_TIMEOUT_MS};
use super::credentials::CredentialPool;
use super::persona::{format_dm, Persona};
use super::types::ConversationTurn;
use crate::error::{GenerationExhaustedError, TransportError};

/// 明确可轮换的状态码
const ROTATABLE_STATUS: &[u16] = &[429, 400, 403, 500];

/// 明确可轮换的错误关键字（小写比较）
const ROTATABLE_PATTERNS: &[&str] = &["quota", "rate", "limit", "exhausted", "api key"];

/// 错误是否属于限流/配额/凭证类问题
///
/// 仅用于日志分类：未分类的错误同样会触发轮换。
pub fn is_rotatable(err: &TransportError) -> bool {
    if let Some(status) = err.status {
        if ROTATABLE_STATUS.contains(&status) {
            return true;
        }
    }
    let msg = err.message.to_lowercase();
    ROTATABLE_PATTERNS.iter().any(|p| msg.contains(p))
}

/// 回复生成器
pub struct ReplyGenerator {
    pool: Arc<CredentialPool>,
    transport: Arc<dyn GenerationTransport>,
    persona: Persona,
    attempt_timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(pool: Arc<CredentialPool>, transport: Arc<dyn GenerationTransport>) -> Self {
        Self {
            pool,
            transport,
            persona: Persona::default(),
            attempt_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// 设置 persona
    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// 设置单次尝试超时
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// 组装模型输入：persona 前言 + 确认 + 历史 + 本条消息
    pub fn build_conversation(
        &self,
        sender: &str,
        message: &str,
        history: &[ConversationTurn],
    ) -> Vec<ConversationTurn> {
        let mut conversation = Vec::with_capacity(history.len() + 3);
        conversation.extend(self.persona.preamble());
        conversation.extend_from_slice(history);
        conversation.push(ConversationTurn::inbound(format_dm(sender, message)));
        conversation
    }

    /// 生成回复
    ///
    /// 返回去除首尾空白后的非空文本；所有凭证都失败时返回错误，调用方不应发送任何内容。
    pub async fn generate(
        &self,
        sender: &str,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<String, GenerationExhaustedError> {
        let conversation = self.build_conversation(sender, message, history);
        let max_attempts = self.pool.len();
        let mut last_error = None;

        info!(sender = %sender, history = history.len(), max_attempts, "Generating reply");

        for attempt in 1..=max_attempts {
            let credential = self.pool.current();
            debug!(attempt, max_attempts, key = credential.index + 1, "Generation attempt");

            let result = match tokio::time::timeout(
                self.attempt_timeout,
                self.transport.send(&credential, &conversation),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::other(format!(
                    "timed out after {}ms",
                    self.attempt_timeout.as_millis()
                ))),
            };

            let result = result.and_then(|text| {
                let text = text.trim();
                if text.is_empty() {
                    Err(TransportError::other("empty response"))
                } else {
                    Ok(text.to_string())
                }
            });

            match result {
                Ok(text) => {
                    info!(
                        sender = %sender,
                        attempt,
                        key = credential.index + 1,
                        reply_len = text.len(),
                        "Reply generated"
                    );
                    return Ok(text);
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts,
                        key = credential.index + 1,
                        status = ?err.status,
                        error = %err.message,
                        rotatable = is_rotatable(&err),
                        "Generation attempt failed, rotating key"
                    );
                    self.pool.rotate();
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| TransportError::other("no attempt was made"));
        error!(
            sender = %sender,
            attempts = max_attempts,
            error = %last,
            "All API keys failed"
        );
        Err(GenerationExhaustedError {
            attempts: max_attempts,
            last,
        })
    }
}
