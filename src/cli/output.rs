//! Output formatting for CLI commands

use serde::Serialize;

/// 按 --json 选择输出格式；非 JSON 时使用 `text` 生成的人类可读文本
pub fn format_output<T, F>(data: &T, json: bool, text: F) -> String
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    if json {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        text(data)
    }
}
