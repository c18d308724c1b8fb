//! PIM Responder - Instagram 私信自动回复

pub mod ai;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod notification;

pub use ai::{
    ConversationTurn, Credential, CredentialPool, GeminiClient, GeminiConfig, GenerationTransport,
    Persona, PoolStatus, ReplyGenerator, Role,
};
pub use config::ResponderConfig;
pub use error::{EmptyPoolError, GenerationExhaustedError, TransportError};
pub use history::{HistoryProvider, JsonlHistory, MemoryHistory};
pub use host::{run_event_loop, HostCommand, JsonLinesHost};
pub use notification::{
    Clock, DropReason, GateConfig, GateDecision, HandleOutcome, InboundMessageGate, ManualClock,
    NotificationBridge, NotificationHost, PlatformNotification, SystemClock,
};
