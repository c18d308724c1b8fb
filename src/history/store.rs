//! 历史存储 - 本地 JSONL 文件读写
//!
//! 默认位置：`~/.config/pim-responder/history.jsonl`，每行一个 `HistoryRecord`。

use anyhow::Result;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{HistoryProvider, DEFAULT_HISTORY_LIMIT};
use crate::ai::{ConversationTurn, Role};

const MAX_RECORDS: usize = 5000;
const KEEP_AFTER_CLEANUP: usize = 2500;
const CLEANUP_CHECK_INTERVAL: usize = 50;

/// 历史记录（JSONL 格式）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    pub sender: String,
    pub role: Role,
    pub content: String,
}

/// JSONL 历史存储
pub struct JsonlHistory {
    path: PathBuf,
    limit: usize,
    write_count: AtomicUsize,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_HISTORY_LIMIT,
            write_count: AtomicUsize::new(0),
        }
    }

    /// 设置每个发送者提供的最大历史轮数
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// 默认存储文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("pim-responder")
            .join("history.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 锁文件路径（`history.jsonl` -> `history.jsonl.lock`）
    ///
    /// 清理会用临时文件替换数据文件，所以锁不能加在数据文件本身上。
    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// 获取锁，返回的文件关闭时释放
    fn lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path())?;
        if exclusive {
            lock.lock_exclusive()?;
        } else {
            lock.lock_shared()?;
        }
        Ok(lock)
    }

    /// 追加记录（带文件锁）
    pub fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        {
            let lock = self.lock(true)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.flush()?;
            lock.unlock()?;
        }

        self.maybe_cleanup();
        Ok(())
    }

    /// 读取全部记录，跳过损坏的行
    pub fn read_all(&self) -> Vec<HistoryRecord> {
        if !self.path.exists() {
            return Vec::new();
        }
        let lock = match self.lock(false) {
            Ok(lock) => lock,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Could not lock history for reading");
                return Vec::new();
            }
        };
        let records = self.read_unlocked();
        let _ = lock.unlock();
        records
    }

    fn read_unlocked(&self) -> Vec<HistoryRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }

    fn maybe_cleanup(&self) {
        let count = self.write_count.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_CHECK_INTERVAL != 0 {
            return;
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            // 估算行数：平均每行 120 字节
            let estimated_lines = metadata.len() as usize / 120;
            if estimated_lines > MAX_RECORDS {
                if let Err(e) = self.cleanup() {
                    tracing::warn!(error = %e, path = %self.path.display(), "History cleanup failed");
                }
            }
        }
    }

    /// 执行清理（保留最近的记录）
    ///
    /// 持有独占锁直到替换完成，期间的 `append` 会等待并写入新文件。
    fn cleanup(&self) -> Result<()> {
        let lock = self.lock(true)?;

        let records = self.read_unlocked();
        if records.len() > MAX_RECORDS {
            let start = records.len() - KEEP_AFTER_CLEANUP;
            let temp_path = self.path.with_extension("tmp");
            {
                let mut temp_file = File::create(&temp_path)?;
                for record in &records[start..] {
                    writeln!(temp_file, "{}", serde_json::to_string(record)?)?;
                }
                temp_file.flush()?;
            }

            // 原子替换
            fs::rename(&temp_path, &self.path)?;
            tracing::debug!(kept = KEEP_AFTER_CLEANUP, dropped = start, "History compacted");
        }

        lock.unlock()?;
        Ok(())
    }
}

impl HistoryProvider for JsonlHistory {
    fn history(&self, sender: &str) -> Result<Vec<ConversationTurn>> {
        let turns: Vec<ConversationTurn> = self
            .read_all()
            .into_iter()
            .filter(|r| r.sender == sender)
            .map(|r| ConversationTurn {
                role: r.role,
                content: r.content,
            })
            .collect();

        let start = turns.len().saturating_sub(self.limit);
        Ok(turns[start..].to_vec())
    }

    fn record(&self, sender: &str, turns: &[ConversationTurn]) -> Result<()> {
        let ts = Utc::now();
        let records: Vec<HistoryRecord> = turns
            .iter()
            .map(|t| HistoryRecord {
                ts,
                sender: sender.to_string(),
                role: t.role,
                content: t.content.clone(),
            })
            .collect();
        self.append(&records)
    }
}
