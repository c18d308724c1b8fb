//! Instagram DM 自动回复 CLI
//!
//! 读取平台通知，用 Gemini 以固定人设生成回复，并把回复发回原通知。

use anyhow::Result;
use clap::{Parser, Subcommand};
use pim_responder::cli::{handle_keys, handle_reply, handle_serve, KeysArgs, ReplyArgs, ServeArgs};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pim")]
#[command(about = "PIM Responder - Instagram 私信自动回复")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从标准输入读取通知并自动回复
    Serve(ServeArgs),
    /// 为一条消息生成回复（调试用）
    Reply(ReplyArgs),
    /// 查看已配置的 API key
    Keys(KeysArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug pim serve
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pim_responder=info,pim=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => handle_serve(args).await?,
        Commands::Reply(args) => handle_reply(args).await?,
        Commands::Keys(args) => handle_keys(args)?,
    }

    Ok(())
}
