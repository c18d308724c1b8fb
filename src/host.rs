//! JSON 行宿主 - 平台监听服务与桥接器之间的薄适配层
//!
//! 输入：每行一个 `PlatformNotification`（JSON）。
//! 输出：每行一个 `HostCommand`（JSON），由平台侧执行真正的回复和清除。
//!
//! ```text
//! -> {"key":"0|com.instagram.android|42","package":"com.instagram.android","title":"bob","text":"hi",
//!     "actions":[{"title":"Reply","inputs":[{"result_key":"reply","allow_free_form":true}]}]}
//! <- {"type":"reply","key":"0|com.instagram.android|42","action":0,"result_key":"reply","text":"yo"}
//! <- {"type":"dismiss","key":"0|com.instagram.android|42"}
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::notification::{
    HandleOutcome, NotificationBridge, NotificationHost, PlatformNotification, ReplyTarget,
};

/// 发给平台的指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// 通过通知动作回复
    Reply {
        key: String,
        /// 动作下标
        action: usize,
        result_key: String,
        text: String,
    },
    /// 清除通知
    Dismiss { key: String },
}

/// 把指令写成 JSON 行的宿主
pub struct JsonLinesHost {
    writer: Mutex<Box<dyn Write + Send>>,
    dry_run: bool,
}

impl JsonLinesHost {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            dry_run: false,
        }
    }

    /// 写到标准输出
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// 设置 dry-run 模式（只记录日志，不输出指令）
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn emit(&self, command: &HostCommand) -> Result<()> {
        if self.dry_run {
            info!(?command, "[DRY-RUN] Would emit host command");
            return Ok(());
        }

        let line = serde_json::to_string(command)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("host writer lock poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl NotificationHost for JsonLinesHost {
    fn name(&self) -> &str {
        "json_lines"
    }

    fn send_reply(&self, notification_key: &str, target: &ReplyTarget, text: &str) -> Result<()> {
        self.emit(&HostCommand::Reply {
            key: notification_key.to_string(),
            action: target.action_index,
            result_key: target.result_key.clone(),
            text: text.to_string(),
        })
    }

    fn dismiss(&self, notification_key: &str) -> Result<()> {
        self.emit(&HostCommand::Dismiss {
            key: notification_key.to_string(),
        })
    }
}

/// 事件循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventLoopStats {
    pub lines: usize,
    pub invalid: usize,
    pub spawned: usize,
}

/// 逐行读取通知并交给桥接器，直到 EOF
///
/// 无法解码或解析的行只记录警告并计入 `invalid`。返回前不等待回复任务，
/// 调用方决定 `wait_idle` 还是 `shutdown`。
pub async fn run_event_loop<R>(bridge: &NotificationBridge, mut reader: R) -> Result<EventLoopStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = EventLoopStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(bytes = buf.len(), "Ignoring notification line that is not valid UTF-8");
            stats.lines += 1;
            stats.invalid += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let notification: PlatformNotification = match serde_json::from_str(line) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed notification line");
                stats.invalid += 1;
                continue;
            }
        };

        debug!(key = %notification.key, package = %notification.package, "Notification received");
        if bridge.handle(&notification) == HandleOutcome::Spawned {
            stats.spawned += 1;
        }
    }

    Ok(stats)
}
