//! 内存历史 - 进程内，每个发送者保留最近 N 轮

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{HistoryProvider, DEFAULT_HISTORY_LIMIT};
use crate::ai::ConversationTurn;

pub struct MemoryHistory {
    turns: Mutex<HashMap<String, VecDeque<ConversationTurn>>>,
    limit: usize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            turns: Mutex::new(HashMap::new()),
            limit,
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryProvider for MemoryHistory {
    fn history(&self, sender: &str) -> Result<Vec<ConversationTurn>> {
        let turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        Ok(turns
            .get(sender)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn record(&self, sender: &str, new_turns: &[ConversationTurn]) -> Result<()> {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        let entry = turns.entry(sender.to_string()).or_default();
        entry.extend(new_turns.iter().cloned());
        while entry.len() > self.limit {
            entry.pop_front();
        }
        Ok(())
    }
}
