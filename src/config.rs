//! 配置加载
//!
//! 读取优先级：
//! 1. 配置文件 `~/.config/pim-responder/config.json`（JSON，所有字段可选）
//! 2. 环境变量覆盖标量字段（`PIM_MODEL`、`PIM_BASE_URL`、`PIM_TIMEOUT_MS`、`PIM_PACKAGE`、
//!    `PIM_PERSONA_NAME`、`PIM_HISTORY_PATH`）
//!
//! API key 合并自配置文件 `api_keys` 和环境变量 `GEMINI_API_KEY`、`GEMINI_API_KEY_2` … `_5`，
//! 空白项被过滤，其余按顺序全部保留。

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ai::client::GeminiConfig;
use crate::ai::{CredentialPool, GeminiClient, Persona, ReplyGenerator};
use crate::error::EmptyPoolError;
use crate::history::{JsonlHistory, DEFAULT_HISTORY_LIMIT};
use crate::notification::{GateConfig, INSTAGRAM_PACKAGE};

/// 读取 API key 的环境变量（按顺序）
pub const API_KEY_VARS: [&str; 5] = [
    "GEMINI_API_KEY",
    "GEMINI_API_KEY_2",
    "GEMINI_API_KEY_3",
    "GEMINI_API_KEY_4",
    "GEMINI_API_KEY_5",
];

/// 配置文件内容
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_keys: Vec<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    package: Option<String>,
    persona_name: Option<String>,
    system_prompt: Option<String>,
    priming: Option<String>,
    history_limit: Option<usize>,
    history_path: Option<PathBuf>,
    gate: Option<GateConfig>,
}

/// 运行配置
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// 已过滤空白的 API key
    pub api_keys: Vec<String>,
    pub gemini: GeminiConfig,
    /// 监听的应用包名
    pub package: String,
    pub persona: Persona,
    pub gate: GateConfig,
    /// 每个发送者提供给模型的历史轮数
    pub history_limit: usize,
    pub history_path: PathBuf,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            gemini: GeminiConfig::default(),
            package: INSTAGRAM_PACKAGE.to_string(),
            persona: Persona::default(),
            gate: GateConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_path: JsonlHistory::default_path(),
        }
    }
}

impl ResponderConfig {
    /// 默认配置文件路径
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("pim-responder")
            .join("config.json")
    }

    /// 从默认配置文件和进程环境加载
    pub fn auto_load() -> Result<Self> {
        Self::load_from(Some(Self::path().as_path()), |name| std::env::var(name).ok())
    }

    /// 从指定配置文件（不存在时跳过）和环境查找函数加载
    pub fn load_from<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                debug!(path = %path.display(), "Loaded config file");
                serde_json::from_str::<FileConfig>(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            _ => FileConfig::default(),
        };

        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // 同一个 key 出现多次时保留多份，每份都占一次尝试
        let env_keys = API_KEY_VARS.iter().copied().filter_map(|name| lookup(name));
        config.api_keys = file
            .api_keys
            .into_iter()
            .chain(env_keys)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();

        if let Some(model) = lookup("PIM_MODEL").or(file.model) {
            config.gemini.model = model;
        }
        if let Some(base_url) = lookup("PIM_BASE_URL").or(file.base_url) {
            config.gemini.base_url = base_url;
        }
        if let Some(raw) = lookup("PIM_TIMEOUT_MS") {
            config.gemini.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("PIM_TIMEOUT_MS must be a number of milliseconds, got {:?}", raw))?;
        } else if let Some(timeout_ms) = file.timeout_ms {
            config.gemini.timeout_ms = timeout_ms;
        }
        if let Some(package) = lookup("PIM_PACKAGE").or(file.package) {
            config.package = package;
        }

        config.persona = match (file.system_prompt, lookup("PIM_PERSONA_NAME").or(file.persona_name)) {
            (Some(prompt), name) => {
                let priming = file.priming.unwrap_or_else(|| {
                    Persona::named(name.as_deref().unwrap_or(crate::ai::persona::DEFAULT_PERSONA_NAME))
                        .priming
                });
                Persona::custom(prompt, priming)
            }
            (None, Some(name)) => Persona::named(&name),
            (None, None) => Persona::default(),
        };

        if let Some(gate) = file.gate {
            config.gate = gate;
        }
        if let Some(limit) = file.history_limit {
            config.history_limit = limit;
        }
        if let Some(path) = lookup("PIM_HISTORY_PATH").map(PathBuf::from).or(file.history_path) {
            config.history_path = path;
        }

        Ok(config)
    }

    /// 构建凭证池
    pub fn credential_pool(&self) -> Result<CredentialPool, EmptyPoolError> {
        CredentialPool::from_secrets(&self.api_keys)
    }

    /// 构建使用 Gemini 的回复生成器；没有可用 key 时返回错误
    pub fn reply_generator(&self) -> Result<ReplyGenerator> {
        let pool = self.credential_pool()?;
        let client = GeminiClient::new(self.gemini.clone())?;
        Ok(ReplyGenerator::new(Arc::new(pool), Arc::new(client))
            .with_persona(self.persona.clone())
            .with_attempt_timeout(Duration::from_millis(self.gemini.timeout_ms)))
    }
}
