//! Serve 命令 - 从标准输入读取平台通知并自动回复
//!
//! 平台侧监听服务把每个通知写成一行 JSON，本进程把回复/清除指令写回标准输出。
//! 日志走 stderr，不会混入指令流。

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::config::ResponderConfig;
use crate::history::{HistoryProvider, JsonlHistory, MemoryHistory};
use crate::host::{run_event_loop, JsonLinesHost};
use crate::notification::{InboundMessageGate, NotificationBridge};

/// Serve 命令参数
#[derive(Args)]
pub struct ServeArgs {
    /// 监听的应用包名（默认读取配置）
    #[arg(long)]
    pub package: Option<String>,

    /// 会话历史文件路径
    #[arg(long, conflicts_with = "memory_history")]
    pub history: Option<PathBuf>,

    /// 只在内存中保留历史
    #[arg(long)]
    pub memory_history: bool,

    /// Dry-run 模式（只打印不发送）
    #[arg(long)]
    pub dry_run: bool,
}

/// 根据参数构建历史存储
fn build_history(args: &ServeArgs, config: &ResponderConfig) -> Arc<dyn HistoryProvider> {
    if args.memory_history {
        return Arc::new(MemoryHistory::with_limit(config.history_limit));
    }
    let path = args.history.clone().unwrap_or_else(|| config.history_path.clone());
    Arc::new(JsonlHistory::new(path).with_limit(config.history_limit))
}

/// 等待进行中的回复；`interrupt` 先完成时取消剩余生成
async fn drain<F>(bridge: &NotificationBridge, interrupt: F)
where
    F: std::future::Future,
{
    tokio::select! {
        _ = bridge.wait_idle() => {}
        _ = interrupt => {
            warn!("Interrupted while draining");
            bridge.shutdown().await;
        }
    }
}

/// 处理 serve 命令
pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    let config = ResponderConfig::auto_load()?;
    let generator = config.reply_generator()?;
    let package = args.package.clone().unwrap_or_else(|| config.package.clone());

    info!(
        package = %package,
        keys = generator.pool().len(),
        model = %config.gemini.model,
        dry_run = args.dry_run,
        "Starting auto-responder"
    );

    let bridge = NotificationBridge::new(
        Arc::new(InboundMessageGate::new(config.gate)),
        Arc::new(generator),
        build_history(&args, &config),
        Arc::new(JsonLinesHost::stdout().with_dry_run(args.dry_run)),
    )
    .with_package(package);

    let reader = BufReader::new(tokio::io::stdin());
    let read_result = tokio::select! {
        result = run_event_loop(&bridge, reader) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match read_result {
        Some(result) => {
            match &result {
                Ok(stats) => info!(
                    lines = stats.lines,
                    invalid = stats.invalid,
                    spawned = stats.spawned,
                    "Input closed, waiting for in-flight replies"
                ),
                Err(e) => warn!(error = %e, "Input failed, waiting for in-flight replies"),
            }
            drain(&bridge, tokio::signal::ctrl_c()).await;
            result?;
        }
        None => {
            warn!("Interrupted");
            bridge.shutdown().await;
        }
    }

    let snapshot = bridge.gate().snapshot();
    info!(
        processed = snapshot.processed_keys,
        echoes = snapshot.sent_echoes,
        senders = snapshot.tracked_senders,
        "Auto-responder stopped"
    );
    Ok(())
}
