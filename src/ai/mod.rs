//! AI 集成 - 凭证池、Gemini 客户端和回复生成

pub mod client;
pub mod credentials;
pub mod generator;
pub mod persona;
pub mod types;

pub use client::{GeminiClient, GeminiConfig, GenerationTransport};
pub use credentials::{mask_secret, Credential, CredentialPool, PoolStatus};
pub use generator::{is_rotatable, ReplyGenerator};
pub use persona::{format_dm, Persona};
pub use types::{ConversationTurn, Role};
