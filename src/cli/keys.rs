//! Keys 命令 - 查看已配置的 API key（脱敏）

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::output::format_output;
use crate::config::ResponderConfig;

/// Keys 命令参数
#[derive(Args)]
pub struct KeysArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Keys 命令输出
#[derive(Debug, Serialize)]
pub struct KeysOutput {
    pub total_credentials: usize,
    pub current_index: usize,
    pub keys: Vec<String>,
    pub model: String,
}

/// 根据配置生成输出
pub fn keys_output(config: &ResponderConfig) -> Result<KeysOutput> {
    let pool = config.credential_pool()?;
    let status = pool.status();
    Ok(KeysOutput {
        total_credentials: status.total_credentials,
        current_index: status.current_index,
        keys: pool.credentials().iter().map(|c| c.masked()).collect(),
        model: config.gemini.model.clone(),
    })
}

/// 处理 keys 命令
pub fn handle_keys(args: KeysArgs) -> Result<()> {
    let config = ResponderConfig::auto_load()?;
    let output = keys_output(&config)?;

    println!(
        "{}",
        format_output(&output, args.json, |o| {
            let mut text = format!("已配置 {} 个 API key（模型: {}）\n", o.total_credentials, o.model);
            for (i, key) in o.keys.iter().enumerate() {
                let marker = if i == o.current_index { "*" } else { " " };
                text.push_str(&format!("  {} #{} {}\n", marker, i + 1, key));
            }
            text.trim_end().to_string()
        })
    );

    Ok(())
}
