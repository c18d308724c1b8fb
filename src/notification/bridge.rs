//! 通知桥接 - 把平台通知翻译成闸门/生成器调用，再把回复发回平台
//!
//! 每个放行的通知都在独立任务中生成回复，不阻塞后续通知的接收。
//! 发送回复、清除通知、写入历史的失败只记录日志，不会影响监听。

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::event::{InboundEvent, PlatformNotification, ReplyTarget, INSTAGRAM_PACKAGE};
use super::gate::{DropReason, GateDecision, InboundMessageGate};
use super::host::NotificationHost;
use crate::ai::{ConversationTurn, ReplyGenerator};
use crate::history::HistoryProvider;

/// 通知被忽略的原因（闸门之前的过滤）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 不是监听的应用
    OtherPackage,
    /// 缺少发送者或消息
    MissingFields,
    /// 分组摘要通知
    GroupSummary,
}

/// 单个通知的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Ignored(IgnoreReason),
    Dropped(DropReason),
    /// 已放行但通知没有可回复的动作（消息仍标记为已处理）
    NoReplyAction,
    /// 已放行，回复任务已启动
    Spawned,
}

/// 生成任务共享的组件
#[derive(Clone)]
struct ReplyContext {
    gate: Arc<InboundMessageGate>,
    generator: Arc<ReplyGenerator>,
    history: Arc<dyn HistoryProvider>,
    host: Arc<dyn NotificationHost>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

/// 通知桥接器
pub struct NotificationBridge {
    ctx: ReplyContext,
    package: String,
    tracker: TaskTracker,
}

impl NotificationBridge {
    pub fn new(
        gate: Arc<InboundMessageGate>,
        generator: Arc<ReplyGenerator>,
        history: Arc<dyn HistoryProvider>,
        host: Arc<dyn NotificationHost>,
    ) -> Self {
        Self {
            ctx: ReplyContext {
                gate,
                generator,
                history,
                host,
                clock: Arc::new(SystemClock),
                cancel: CancellationToken::new(),
            },
            package: INSTAGRAM_PACKAGE.to_string(),
            tracker: TaskTracker::new(),
        }
    }

    /// 注入时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    /// 设置监听的应用包名
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn gate(&self) -> &InboundMessageGate {
        &self.ctx.gate
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// 处理一个平台通知（需要在 tokio runtime 中调用）
    pub fn handle(&self, notification: &PlatformNotification) -> HandleOutcome {
        if notification.package != self.package {
            debug!(package = %notification.package, "Skipping notification from other app");
            return HandleOutcome::Ignored(IgnoreReason::OtherPackage);
        }

        let Some((sender, message)) = notification.sender_and_message() else {
            warn!(key = %notification.key, "Missing sender or message, skipping");
            return HandleOutcome::Ignored(IgnoreReason::MissingFields);
        };

        if notification.group_summary {
            debug!(key = %notification.key, "Skipping group summary notification");
            return HandleOutcome::Ignored(IgnoreReason::GroupSummary);
        }

        let now = self.ctx.clock.now_ms();
        if let GateDecision::Drop(reason) = self.ctx.gate.evaluate(sender, message, now) {
            debug!(sender = %sender, reason = %reason, "Notification dropped");
            return HandleOutcome::Dropped(reason);
        }

        let Some(target) = notification.find_reply_action() else {
            warn!(sender = %sender, key = %notification.key, "No reply action found for this notification");
            return HandleOutcome::NoReplyAction;
        };

        info!(sender = %sender, action = %target.action_title, "Instagram DM admitted");

        let event = InboundEvent {
            sender: sender.to_string(),
            message: message.to_string(),
            observed_at_ms: now,
        };
        let ctx = self.ctx.clone();
        let key = notification.key.clone();
        self.tracker.spawn(async move {
            process_admitted(ctx, event, key, target).await;
        });

        HandleOutcome::Spawned
    }

    /// 正在运行的回复任务数
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// 等待所有已启动的回复任务完成
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// 取消进行中的生成并等待任务退出
    pub async fn shutdown(&self) {
        info!(in_flight = self.tracker.len(), "Shutting down notification bridge");
        self.ctx.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// 已放行消息的完整处理：生成 → 记录回声 → 回复 → 清除通知 → 写历史
async fn process_admitted(ctx: ReplyContext, event: InboundEvent, key: String, target: ReplyTarget) {
    let InboundEvent { sender, message, observed_at_ms } = event;

    // 历史存储可能做阻塞文件 I/O 和加锁，放到阻塞线程池
    let store = ctx.history.clone();
    let who = sender.clone();
    let history = match tokio::task::spawn_blocking(move || store.history(&who)).await {
        Ok(Ok(history)) => history,
        Ok(Err(e)) => {
            warn!(sender = %sender, error = %e, "Failed to load history, continuing without it");
            Vec::new()
        }
        Err(e) => {
            warn!(sender = %sender, error = %e, "History lookup task failed, continuing without it");
            Vec::new()
        }
    };

    let result = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            info!(sender = %sender, "Reply generation cancelled");
            return;
        }
        result = ctx.generator.generate(&sender, &message, &history) => result,
    };

    let reply = match result {
        Ok(reply) => reply,
        Err(e) => {
            // 消息保持已处理状态，不会再次尝试
            error!(sender = %sender, error = %e, "Failed to get reply, dropping message");
            return;
        }
    };

    // 先记录回声：我们自己的回复可能在 send_reply 返回前就以通知形式出现
    let now = ctx.clock.now_ms();
    ctx.gate.record_reply(&sender, &reply, now);

    match ctx.host.send_reply(&key, &target, &reply) {
        Ok(()) => info!(
            sender = %sender,
            host = ctx.host.name(),
            latency_ms = now.saturating_sub(observed_at_ms),
            "Reply sent"
        ),
        Err(e) => warn!(sender = %sender, host = ctx.host.name(), error = %e, "Failed to send reply"),
    }

    match ctx.host.dismiss(&key) {
        Ok(()) => debug!(key = %key, "Notification dismissed"),
        Err(e) => warn!(key = %key, error = %e, "Could not dismiss notification"),
    }

    let turns = [ConversationTurn::inbound(message), ConversationTurn::generated(reply)];
    let store = ctx.history.clone();
    let who = sender.clone();
    match tokio::task::spawn_blocking(move || store.record(&who, &turns)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(sender = %sender, error = %e, "Failed to record history"),
        Err(e) => warn!(sender = %sender, error = %e, "History record task failed"),
    }
}
