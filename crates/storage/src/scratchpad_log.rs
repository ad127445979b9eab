//! 研究会话轨迹的 JSONL 持久化。
//!
//! 一次会话一个文件，三类行按顺序写入：
//! - `init`：原始查询
//! - `tool_result`：每次工具调用的入参、结果与错误
//! - `answer`：最终回答（如有）
//!
//! 调用方把写盘失败当非致命处理，不影响对话流程。

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;

use finsage_core::{Result, ToolCallRecord};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogLine<'a> {
    Init {
        timestamp: String,
        query: &'a str,
    },
    ToolResult {
        timestamp: String,
        #[serde(rename = "toolName")]
        tool_name: &'a str,
        args: &'a Value,
        result: &'a str,
        error: Option<&'a str>,
    },
    Answer {
        timestamp: String,
        content: &'a str,
    },
}

/// 将一次会话的调用轨迹写入 `path`，父目录不存在时自动创建。
pub fn write_scratchpad_log(
    path: &Path,
    query: &str,
    records: &[ToolCallRecord],
    final_answer: Option<&str>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    write_line(
        &mut file,
        &LogLine::Init {
            timestamp: Local::now().to_rfc3339(),
            query,
        },
    )?;

    for record in records {
        write_line(
            &mut file,
            &LogLine::ToolResult {
                timestamp: record.timestamp.to_rfc3339(),
                tool_name: &record.tool_name,
                args: &record.args,
                result: &record.result,
                error: record.error.as_deref(),
            },
        )?;
    }

    if let Some(content) = final_answer {
        write_line(
            &mut file,
            &LogLine::Answer {
                timestamp: Local::now().to_rfc3339(),
                content,
            },
        )?;
    }

    Ok(())
}

fn write_line(file: &mut File, line: &LogLine) -> Result<()> {
    let json = serde_json::to_string(line)?;
    writeln!(file, "{}", json)?;
    Ok(())
}
