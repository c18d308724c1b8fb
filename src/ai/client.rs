//! Gemini API 客户端
//!
//! `GenerationTransport` 是生成器与远程模型之间的接缝：发送整段对话，
//! 返回文本或带状态码的错误。`GeminiClient` 是基于 `generateContent` 的实现。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::credentials::Credential;
use super::types::ConversationTurn;
use crate::error::TransportError;

/// Gemini API 基础 URL
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 默认模型
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// 默认单次请求超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// 生成传输层
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// 使用指定凭证发送对话，返回模型原始文本
    async fn send(
        &self,
        credential: &Credential,
        conversation: &[ConversationTurn],
    ) -> Result<String, TransportError>;
}

/// Gemini 客户端配置
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API 基础 URL（支持代理）
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// 请求超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl GeminiConfig {
    /// `generateContent` 完整地址
    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// generateContent 请求体
#[derive(Serialize)]
pub(crate) struct GenerateContentRequest<'a> {
    pub contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
pub(crate) struct Content<'a> {
    pub role: &'a str,
    pub parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
pub(crate) struct Part<'a> {
    pub text: &'a str,
}

/// generateContent 响应体
#[derive(Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
pub(crate) struct ResponsePart {
    pub text: Option<String>,
}

/// API 错误响应
#[derive(Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    pub code: Option<u16>,
    pub message: String,
    pub status: Option<String>,
}

/// 对话 → 请求体
pub(crate) fn build_request(conversation: &[ConversationTurn]) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: conversation
            .iter()
            .map(|turn| Content {
                role: turn.role.wire_name(),
                parts: vec![Part {
                    text: &turn.content,
                }],
            })
            .collect(),
    }
}

/// 解析成功响应，拼接第一个候选的所有文本片段
pub(crate) fn parse_response(body: &str) -> Result<String, TransportError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::other(format!("Failed to parse response: {} - body: {}", e, body)))?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<String>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(text)
}

/// 解析错误响应；无法解析时保留原始 body
pub(crate) fn parse_error(status: u16, body: &str) -> TransportError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(resp) => {
            let message = match resp.error.status {
                Some(s) => format!("{} ({})", resp.error.message, s),
                None => resp.error.message,
            };
            TransportError::new(Some(resp.error.code.unwrap_or(status)), message)
        }
        Err(_) => TransportError::new(Some(status), body.to_string()),
    }
}

/// Gemini API 客户端
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// 创建新客户端
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationTransport for GeminiClient {
    async fn send(
        &self,
        credential: &Credential,
        conversation: &[ConversationTurn],
    ) -> Result<String, TransportError> {
        let request = build_request(conversation);

        debug!(
            model = %self.config.model,
            turns = conversation.len(),
            key = credential.index + 1,
            timeout_ms = self.config.timeout_ms,
            "Sending request to Gemini API"
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.config.endpoint())
            .header("x-goog-api-key", credential.secret())
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TransportError::new(
                    e.status().map(|s| s.as_u16()),
                    format!("API request failed after {}ms: {}", start.elapsed().as_millis(), e),
                )
            })?;

        debug!(elapsed_ms = start.elapsed().as_millis(), "API request completed");

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::other(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        let text = parse_response(&body)?;
        if text.trim().is_empty() {
            warn!("Empty response from Gemini API");
        }
        Ok(text)
    }
}
