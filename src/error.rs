//! 错误类型
//!
//! 库内部的可区分错误使用 `thiserror`，I/O 边界（配置、历史记录、宿主分发）使用 `anyhow`。

use std::fmt;
use thiserror::Error;

/// 没有可用的 API 凭证（启动时致命，不重试）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no usable API credentials: set GEMINI_API_KEY (or api_keys in the config file)")]
pub struct EmptyPoolError;

/// 单次生成调用的传输层失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TransportError {
    /// HTTP 状态码（网络错误或超时时为空）
    pub status: Option<u16>,
    /// 错误描述
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 无状态码的错误（网络错误、超时、空响应）
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// 凭证池中每个凭证都已尝试且失败
#[derive(Debug, Clone, Error)]
#[error("all {attempts} credential attempt(s) failed, last error: {last}")]
pub struct GenerationExhaustedError {
    /// 本次调用实际尝试次数
    pub attempts: usize,
    /// 最后一次失败（用于诊断）
    #[source]
    pub last: TransportError,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "transport error ({}): {}", code, self.message),
            None => write!(f, "transport error: {}", self.message),
        }
    }
}
