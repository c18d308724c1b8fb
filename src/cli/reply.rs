//! Reply 命令 - 不经过通知，直接为一条消息生成回复
//!
//! 便于调试 persona 和 key 轮换。

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::output::format_output;
use crate::config::ResponderConfig;

/// Reply 命令参数
#[derive(Args)]
pub struct ReplyArgs {
    /// 收到的消息
    pub message: String,

    /// 发送者名称
    #[arg(long, short, default_value = "Unknown")]
    pub sender: String,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Reply 命令输出
#[derive(Debug, Serialize)]
pub struct ReplyOutput {
    pub sender: String,
    pub message: String,
    pub reply: String,
    /// 生成后使用的 key 序号（从 1 开始）
    pub key_index: usize,
}

/// 处理 reply 命令
pub async fn handle_reply(args: ReplyArgs) -> Result<()> {
    let config = ResponderConfig::auto_load()?;
    let generator = config.reply_generator()?;

    let reply = generator.generate(&args.sender, &args.message, &[]).await?;

    let output = ReplyOutput {
        sender: args.sender,
        message: args.message,
        reply,
        key_index: generator.pool().status().current_index + 1,
    };

    println!("{}", format_output(&output, args.json, |o| o.reply.clone()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_output_serialization() {
        let output = ReplyOutput {
            sender: "bob".to_string(),
            message: "hi".to_string(),
            reply: "hey lol".to_string(),
            key_index: 2,
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"reply\":\"hey lol\""));
        assert!(json.contains("\"key_index\":2"));
    }
}
