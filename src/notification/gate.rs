//! 入站消息闸门 - 防止回复自己的消息、重复投递和刷屏
//!
//! Instagram 会把我们自己发出的回复、同一条消息的重复投递也推送成通知。
//! 此模块对每个通知做 admit/drop 判断。
//!
//! ## 判断顺序（先匹配先返回）
//! 1. 自回声：消息（小写、去空白）出现在最近发出的回复中
//! 2. 重复：`sender:message` 已处理过
//! 3. 冷却：距该发送者上次回复不足 10 秒
//! 4. 放行：立即把 `sender:message` 标记为已处理（生成开始之前）

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

use super::bounded::BoundedSet;

/// 同一发送者两次放行之间的最小间隔（毫秒）
pub const DEFAULT_COOLDOWN_MS: u64 = 10_000;

/// 已处理消息键的容量
pub const DEFAULT_MAX_PROCESSED: usize = 100;

/// 自回声集合的容量
pub const DEFAULT_MAX_ECHOES: usize = 50;

/// 闸门配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub cooldown_ms: u64,
    pub max_processed: usize,
    pub max_echoes: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            max_processed: DEFAULT_MAX_PROCESSED,
            max_echoes: DEFAULT_MAX_ECHOES,
        }
    }
}

/// 丢弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 我们自己发出的回复
    SelfEcho,
    /// 同一条消息已经处理过
    Duplicate,
    /// 冷却中，`remaining_ms` 后才会再次放行
    Cooldown { remaining_ms: u64 },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfEcho => write!(f, "self-echo"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Cooldown { remaining_ms } => write!(f, "cooldown ({}ms left)", remaining_ms),
        }
    }
}

/// 闸门判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Drop(DropReason),
}

impl GateDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// 闸门状态大小（诊断用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub processed_keys: usize,
    pub sent_echoes: usize,
    pub tracked_senders: usize,
}

/// 闸门状态（进程级，不持久化）
#[derive(Debug)]
pub struct GateState {
    /// 已处理的 `sender:message`
    processed_keys: BoundedSet,
    /// 发送者 -> 上次回复时间（毫秒）
    last_reply_at: HashMap<String, u64>,
    /// 我们发出的回复（小写、去空白）
    sent_echoes: BoundedSet,
    cooldown_ms: u64,
}

impl GateState {
    pub fn new(config: GateConfig) -> Self {
        Self {
            processed_keys: BoundedSet::new(config.max_processed),
            last_reply_at: HashMap::new(),
            sent_echoes: BoundedSet::new(config.max_echoes),
            cooldown_ms: config.cooldown_ms,
        }
    }

    /// 判断并在放行时标记为已处理
    pub fn evaluate(&mut self, sender: &str, message: &str, now_ms: u64) -> GateDecision {
        if self.sent_echoes.contains(&normalize_echo(message)) {
            debug!(sender = %sender, "Skipping own reply");
            return GateDecision::Drop(DropReason::SelfEcho);
        }

        let key = message_key(sender, message);
        if self.processed_keys.contains(&key) {
            debug!(sender = %sender, "Skipping already processed message");
            return GateDecision::Drop(DropReason::Duplicate);
        }

        // 从未回复过的发送者不受冷却限制
        if let Some(&last) = self.last_reply_at.get(sender) {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < self.cooldown_ms {
                let remaining_ms = self.cooldown_ms - elapsed;
                debug!(sender = %sender, remaining_ms, "Skipping, cooldown active");
                return GateDecision::Drop(DropReason::Cooldown { remaining_ms });
            }
        }

        self.processed_keys.insert(key);
        GateDecision::Admit
    }

    /// 记录已发出的回复：加入自回声集合并刷新冷却时间
    pub fn record_reply(&mut self, sender: &str, reply_text: &str, now_ms: u64) {
        self.sent_echoes.insert(normalize_echo(reply_text));
        let last = self.last_reply_at.entry(sender.to_string()).or_insert(now_ms);
        *last = (*last).max(now_ms);
    }

    pub fn last_reply_at(&self, sender: &str) -> Option<u64> {
        self.last_reply_at.get(sender).copied()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            processed_keys: self.processed_keys.len(),
            sent_echoes: self.sent_echoes.len(),
            tracked_senders: self.last_reply_at.len(),
        }
    }
}

/// 线程安全的闸门
///
/// 判断与标记在同一把锁内完成，两个并发的相同通知只有一个会被放行。
#[derive(Debug)]
pub struct InboundMessageGate {
    state: Mutex<GateState>,
}

impl InboundMessageGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            state: Mutex::new(GateState::new(config)),
        }
    }

    pub fn evaluate(&self, sender: &str, message: &str, now_ms: u64) -> GateDecision {
        self.lock().evaluate(sender, message, now_ms)
    }

    pub fn record_reply(&self, sender: &str, reply_text: &str, now_ms: u64) {
        self.lock().record_reply(sender, reply_text, now_ms)
    }

    pub fn last_reply_at(&self, sender: &str) -> Option<u64> {
        self.lock().last_reply_at(sender)
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.lock().snapshot()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // 状态只有集合操作，持锁线程 panic 后数据仍然一致
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InboundMessageGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

/// 去重键：精确匹配，区分大小写，不去空白
fn message_key(sender: &str, message: &str) -> String {
    format!("{}:{}", sender, message)
}

/// 自回声比较形式
fn normalize_echo(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_duplicate_then_cooldown_then_admit() {
        let gate = InboundMessageGate::default();

        assert_eq!(gate.evaluate("bob", "hi", T0), GateDecision::Admit);
        assert_eq!(
            gate.evaluate("bob", "hi", T0),
            GateDecision::Drop(DropReason::Duplicate)
        );

        gate.record_reply("bob", "yo", T0);

        assert_eq!(
            gate.evaluate("bob", "hi2", T0 + 1),
            GateDecision::Drop(DropReason::Cooldown { remaining_ms: 9_999 })
        );
        assert_eq!(gate.evaluate("bob", "hi2", T0 + 10_001), GateDecision::Admit);
    }

    #[test]
    fn test_cooldown_boundary() {
        let gate = InboundMessageGate::default();
        gate.record_reply("bob", "yo", T0);

        assert!(!gate.evaluate("bob", "a", T0 + 9_999).is_admit());
        assert!(gate.evaluate("bob", "b", T0 + 10_000).is_admit());
    }

    #[test]
    fn test_cooldown_is_per_sender() {
        let gate = InboundMessageGate::default();
        gate.record_reply("bob", "yo", T0);

        assert!(gate.evaluate("amy", "hi", T0 + 1).is_admit());
        assert!(!gate.evaluate("bob", "hi", T0 + 1).is_admit());
    }

    #[test]
    fn test_duplicate_stays_dropped_after_cooldown() {
        let gate = InboundMessageGate::default();
        assert!(gate.evaluate("bob", "hi", T0).is_admit());
        assert_eq!(
            gate.evaluate("bob", "hi", T0 + 3_600_000),
            GateDecision::Drop(DropReason::Duplicate)
        );
    }

    #[test]
    fn test_self_echo_is_case_and_whitespace_insensitive() {
        let gate = InboundMessageGate::default();
        gate.record_reply("bob", "  Hey LOL ", T0);

        assert_eq!(
            gate.evaluate("amy", "hey lol", T0 + 60_000),
            GateDecision::Drop(DropReason::SelfEcho)
        );
        assert_eq!(
            gate.evaluate("bob", "HEY LOL\n", T0 + 60_000),
            GateDecision::Drop(DropReason::SelfEcho)
        );
    }

    #[test]
    fn test_self_echo_checked_before_duplicate() {
        let gate = InboundMessageGate::default();
        assert!(gate.evaluate("bob", "lol", T0).is_admit());
        gate.record_reply("bob", "lol", T0);

        assert_eq!(
            gate.evaluate("bob", "lol", T0),
            GateDecision::Drop(DropReason::SelfEcho)
        );
    }

    #[test]
    fn test_duplicate_checked_before_cooldown() {
        let gate = InboundMessageGate::default();
        assert!(gate.evaluate("bob", "hi", T0).is_admit());
        gate.record_reply("bob", "yo", T0);

        assert_eq!(
            gate.evaluate("bob", "hi", T0 + 1),
            GateDecision::Drop(DropReason::Duplicate)
        );
    }

    #[test]
    fn test_duplicate_key_is_exact() {
        let gate = InboundMessageGate::new(GateConfig {
            cooldown_ms: 0,
            ..Default::default()
        });
        assert!(gate.evaluate("bob", "hi", T0).is_admit());
        assert!(gate.evaluate("bob", "Hi", T0).is_admit());
        assert!(gate.evaluate("bob", "hi ", T0).is_admit());
        assert!(gate.evaluate("Bob", "hi", T0).is_admit());
    }

    #[test]
    fn test_processed_keys_bounded_fifo() {
        let gate = InboundMessageGate::default();
        for i in 0..150 {
            assert!(gate.evaluate(&format!("user{}", i), "hi", T0).is_admit());
            assert!(gate.snapshot().processed_keys <= DEFAULT_MAX_PROCESSED);
        }
        assert_eq!(gate.snapshot().processed_keys, 100);
        // 最旧的 50 个已被淘汰，可以再次放行
        assert!(gate.evaluate("user0", "hi", T0).is_admit());
        assert_eq!(
            gate.evaluate("user149", "hi", T0),
            GateDecision::Drop(DropReason::Duplicate)
        );
    }

    #[test]
    fn test_sent_echoes_bounded_fifo() {
        let gate = InboundMessageGate::default();
        for i in 0..60 {
            gate.record_reply("bob", &format!("reply {}", i), T0 + i);
        }
        assert_eq!(gate.snapshot().sent_echoes, DEFAULT_MAX_ECHOES);
        assert!(gate.evaluate("amy", "reply 0", T0 + 100_000).is_admit());
        assert_eq!(
            gate.evaluate("amy", "reply 59", T0 + 100_000),
            GateDecision::Drop(DropReason::SelfEcho)
        );
    }

    #[test]
    fn test_last_reply_at_is_monotonic() {
        let gate = InboundMessageGate::default();
        gate.record_reply("bob", "a", T0 + 500);
        gate.record_reply("bob", "b", T0);
        assert_eq!(gate.last_reply_at("bob"), Some(T0 + 500));
        gate.record_reply("bob", "c", T0 + 900);
        assert_eq!(gate.last_reply_at("bob"), Some(T0 + 900));
    }

    #[test]
    fn test_concurrent_identical_events_admit_once() {
        let gate = Arc::new(InboundMessageGate::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.evaluate("bob", "hi", T0).is_admit())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::SelfEcho.to_string(), "self-echo");
        assert_eq!(DropReason::Duplicate.to_string(), "duplicate");
        assert_eq!(
            DropReason::Cooldown { remaining_ms: 4_000 }.to_string(),
            "cooldown (4000ms left)"
        );
    }

    #[test]
    fn test_gate_config_deserializes_with_defaults() {
        let config: GateConfig = serde_json::from_str(r#"{"cooldown_ms": 5000}"#).unwrap();
        assert_eq!(config.cooldown_ms, 5_000);
        assert_eq!(config.max_processed, DEFAULT_MAX_PROCESSED);
        assert_eq!(config.max_echoes, DEFAULT_MAX_ECHOES);
    }
}
