//! API 凭证池 - 多个可互换的 key，失败时轮换
//!
//! 轮换索引是进程级共享状态，并发任务通过 CAS 原子推进。
//! 池一旦构建就至少有一个凭证，运行期间不会移除任何凭证。

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::error::EmptyPoolError;

/// 单个 API 凭证
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// 在池中的序号（从 0 开始）
    pub index: usize,
    secret: String,
}

impl Credential {
    /// 原始 key，仅在发请求时使用
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// 脱敏显示：前 8 位 + ... + 后 4 位
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("secret", &self.masked())
            .finish()
    }
}

/// 凭证池状态（诊断用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total_credentials: usize,
    pub current_index: usize,
}

/// 凭证池
pub struct CredentialPool {
    credentials: Vec<Credential>,
    current: AtomicUsize,
}

impl CredentialPool {
    /// 从 key 列表构建凭证池
    ///
    /// 空白 key 会被过滤；过滤后为空则返回 `EmptyPoolError`。
    pub fn from_secrets<I, S>(secrets: I) -> Result<Self, EmptyPoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(index, secret)| Credential { index, secret })
            .collect();

        if credentials.is_empty() {
            return Err(EmptyPoolError);
        }

        for credential in &credentials {
            debug!(key = credential.index + 1, masked = %credential.masked(), "Loaded API key");
        }
        info!(count = credentials.len(), "Credential pool ready");

        Ok(Self {
            credentials,
            current: AtomicUsize::new(0),
        })
    }

    /// 当前凭证
    pub fn current(&self) -> Credential {
        let index = self.current.load(Ordering::SeqCst);
        self.credentials[index].clone()
    }

    /// 轮换到下一个凭证（循环），返回新的索引
    pub fn rotate(&self) -> usize {
        let len = self.credentials.len();
        // 闭包总是返回 Some，fetch_update 不会失败
        let old = match self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };
        let new = (old + 1) % len;
        info!(from = old + 1, to = new + 1, total = len, "Rotated API key");
        new
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// 构建成功的池永远非空
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            total_credentials: self.credentials.len(),
            current_index: self.current.load(Ordering::SeqCst),
        }
    }

    /// 所有凭证（按序号）
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

/// 脱敏 key：短于 12 个字符时整体隐藏
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
