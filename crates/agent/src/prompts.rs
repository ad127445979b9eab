//! 提示词与计划解析。
//!
//! 所有提示词为中文，面向国内模型调优。系统提示词包含当前日期，
//! 规划提示词要求模型输出纯 JSON 步骤列表，[`parse_plan`] 负责
//! 容错解析（JSON 对象 / 纯数组 / 按行兜底）。

use chrono::{Datelike, Local};
use regex::Regex;
use serde_json::Value;

/// 计划步骤上限，所有解析路径统一截断。
pub const MAX_PLAN_STEPS: usize = 10;

pub const PLANNING_SYSTEM_PROMPT: &str = r#"你是金融研究任务规划助手。将用户问题拆解为 2～5 个可执行步骤。

输出格式（纯 JSON，无其他内容）：
{"steps": [{"goal": "步骤1描述"}, {"goal": "步骤2描述"}]}

示例：
用户问："分析贵州茅台"
输出：{"steps": [{"goal": "搜索茅台股票代码"}, {"goal": "获取实时行情和基本信息"}, {"goal": "查看行业板块表现"}]}

要求：
- 步骤顺序：先搜索/定位 → 查详情/行情 → 查板块/宏观
- 每步一句话，动词开头（如"搜索"、"获取"、"查看"）
- 步骤独立，可并行执行的合并为一步
- 不输出 markdown 代码块标记"#;

pub const FINAL_ANSWER_PROMPT: &str = "\n基于以上收集到的所有信息，请给出最终的分析和回答。\n\n要求：\n1. 综合所有数据，给出清晰的结论\n2. 用结构化的方式呈现分析结果\n3. 如果涉及投资建议，提供风险提示\n4. 使用中文回答\n";

/// 最终回答前的自检提示，与 FINAL_ANSWER 合并使用。
pub const SELF_VALIDATION_PROMPT: &str = "\n请先自检当前已获取的工具结果：\n1. 是否足以回答用户问题？有无明显遗漏（如缺少关键代码、时间范围、板块名称等）？\n2. 是否存在矛盾或异常（如同一指标多处不一致）？\n\n若数据已充分，请直接给出最终的分析和回答（要求：结论清晰、结构化、含风险提示、中文）。\n若发现明显不足，请简要说明还缺哪类数据，然后基于现有信息给出力所能及的回答，并注明数据限制。\n";

/// 疑似循环/无进展时注入，要求基于已有信息收尾。
pub const LOOP_DETECTED_PROMPT: &str = "\n检测到近期多次工具调用未取得有效数据或重复尝试，请基于目前已获取的任何信息，直接给出最终回答。\n\n要求：简要总结已掌握的信息，说明数据上的限制（如有），给出力所能及的结论与风险提示，使用中文。不要再调用工具。\n";

/// 含当前日期的系统提示词。
pub fn system_prompt() -> String {
    let now = Local::now();
    let weekday = match now.weekday() {
        chrono::Weekday::Mon => "星期一",
        chrono::Weekday::Tue => "星期二",
        chrono::Weekday::Wed => "星期三",
        chrono::Weekday::Thu => "星期四",
        chrono::Weekday::Fri => "星期五",
        chrono::Weekday::Sat => "星期六",
        chrono::Weekday::Sun => "星期日",
    };
    format!(
        "你是专业的金融研究分析师助手，专注于中国股票及港股市场分析。\n\
         \n\
         今天是 {} {}。\n\
         \n\
         ## 核心原则\n\
         \n\
         1. **数据驱动**: 先获取数据再分析，基于事实而非推测\n\
         2. **高效执行**: 优先使用最直接的工具，避免重复调用\n\
         3. **并行思维**: 多个独立数据可以同时获取（如查询多只股票）\n\
         4. **结构化输出**: 用清晰的格式呈现分析结果\n\
         5. **风险提示**: 投资建议必须包含风险说明\n\
         \n\
         ## 工具使用技巧\n\
         \n\
         - 搜索股票：优先用 `search_stock_any`（跨市场），明确市场时用 `search_stock` 或 `search_stock_hk`\n\
         - 行业分析：用 `get_industry_board_detail` 获取行业整体数据（涨跌幅、PE/PB）\n\
         - 多只股票：可以连续调用工具获取不同股票数据\n\
         - 历史数据：明确指定时间范围，避免获取过多数据\n\
         \n\
         ## 注意\n\
         \n\
         - 信息仅供参考，不构成投资建议\n\
         - 数据可能存在延迟或误差\n\
         - 日期计算需准确（不要混淆星期几）\n",
        now.format("%Y年%m月%d日"),
        weekday
    )
}

/// 执行阶段前注入一次研究计划摘要。
pub fn plan_summary(goals: &[String]) -> String {
    let mut out = format!("研究计划（共 {} 步）：\n", goals.len());
    out.push_str(
        &goals
            .iter()
            .enumerate()
            .map(|(i, g)| format!("  {}. {}", i + 1, g))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    out.push_str("\n\n请按上述步骤依次执行。下面将只给出当前需要完成的那一步。");
    out
}

/// 当前步骤指令，强调只完成本步。
pub fn step_message(k: usize, n_steps: usize, goal: &str) -> String {
    format!(
        "【仅完成第 {}/{} 步】{}\n\n请只为本步骤调用所需工具，不要为后续步骤调用工具。完成本步后回复简要说明即可。",
        k, n_steps, goal
    )
}

/// 从规划阶段 LLM 输出中解析出步骤目标列表。
///
/// 支持 JSON 对象 `{"steps": [{"goal": "..."}, ...]}` 或纯数组，
/// 条目可以是 `{"goal": ...}` 或字符串；空目标会被丢弃。
/// JSON 解析失败时按行解析 "N. 描述" 格式兜底。
pub fn parse_plan(llm_output: &str) -> Vec<String> {
    let trimmed = llm_output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // 去掉可能的 markdown 代码块
    let mut text = trimmed;
    if text.contains("```") {
        for marker in ["```json", "```"] {
            if let Some(pos) = text.find(marker) {
                let rest = &text[pos + marker.len()..];
                text = match rest.find("```") {
                    Some(end) => rest[..end].trim(),
                    None => rest.trim(),
                };
                break;
            }
        }
    }

    if let Ok(data) = serde_json::from_str::<Value>(text) {
        let steps = match &data {
            Value::Object(obj) => obj.get("steps").and_then(Value::as_array).cloned(),
            Value::Array(arr) => Some(arr.clone()),
            _ => None,
        };
        let Some(steps) = steps else {
            return Vec::new();
        };
        let mut goals = Vec::new();
        for step in &steps {
            let goal = match step {
                Value::Object(obj) => match obj.get("goal") {
                    Some(Value::String(s)) => Some(s.trim().to_string()),
                    Some(other) => Some(other.to_string()),
                    None => None,
                },
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            };
            if let Some(goal) = goal {
                if !goal.is_empty() {
                    goals.push(goal);
                }
            }
        }
        goals.truncate(MAX_PLAN_STEPS);
        return goals;
    }

    // 兜底：按行解析 "1. 步骤描述" 或裸描述行
    let step_line = Regex::new(r"^\d+[.．]\s*(.+)$").unwrap();
    let mut goals = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = step_line.captures(line) {
            let goal = caps[1].trim().to_string();
            if !goal.is_empty() {
                goals.push(goal);
            }
        } else if line.chars().count() > 2 && !line.starts_with('{') {
            goals.push(line.to_string());
        }
    }
    goals.truncate(MAX_PLAN_STEPS);
    goals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_json_object() {
        let out = r#"{"steps": [{"goal": "搜索茅台股票代码"}, {"goal": "获取实时行情"}]}"#;
        assert_eq!(parse_plan(out), vec!["搜索茅台股票代码", "获取实时行情"]);
    }

    #[test]
    fn test_parse_plan_strips_fenced_block() {
        let out = "```json\n{\"steps\": [{\"goal\": \"查看行业板块表现\"}]}\n```";
        assert_eq!(parse_plan(out), vec!["查看行业板块表现"]);

        let bare = "```\n{\"steps\": [\"搜索股票\"]}\n```";
        assert_eq!(parse_plan(bare), vec!["搜索股票"]);
    }

    #[test]
    fn test_parse_plan_bare_array_and_string_entries() {
        let out = r#"[{"goal": "步骤一"}, "步骤二", {"goal": 3}]"#;
        assert_eq!(parse_plan(out), vec!["步骤一", "步骤二", "3"]);
    }

    #[test]
    fn test_parse_plan_filters_empty_goals() {
        let out = r#"{"steps": [{"goal": "  "}, {"goal": "查询宏观数据"}, ""]}"#;
        assert_eq!(parse_plan(out), vec!["查询宏观数据"]);
    }

    #[test]
    fn test_parse_plan_numbered_lines_fallback() {
        // 两字以内的行（如"好的"）视为寒暄丢弃
        let out = "1. 搜索股票代码\n2．获取历史行情\n\n好的";
        assert_eq!(parse_plan(out), vec!["搜索股票代码", "获取历史行情"]);
    }

    #[test]
    fn test_parse_plan_fallback_skips_short_and_brace_lines() {
        let out = "ok\n{\"糟糕的json\"\n查看北向资金流向";
        assert_eq!(parse_plan(out), vec!["查看北向资金流向"]);
    }

    #[test]
    fn test_parse_plan_empty_and_non_plan_json() {
        assert!(parse_plan("").is_empty());
        assert!(parse_plan("   \n ").is_empty());
        assert!(parse_plan("{}").is_empty());
        assert!(parse_plan(r#"{"plan": []}"#).is_empty());
        assert!(parse_plan("42").is_empty());
    }

    #[test]
    fn test_parse_plan_caps_step_count() {
        let steps: Vec<String> = (1..=15).map(|i| format!("{{\"goal\": \"步骤{}\"}}", i)).collect();
        let json = format!("{{\"steps\": [{}]}}", steps.join(", "));
        assert_eq!(parse_plan(&json).len(), MAX_PLAN_STEPS);

        let lines: Vec<String> = (1..=15).map(|i| format!("{}. 执行第{}件事", i, i)).collect();
        assert_eq!(parse_plan(&lines.join("\n")).len(), MAX_PLAN_STEPS);
    }

    #[test]
    fn test_system_prompt_contains_date_and_rules() {
        let prompt = system_prompt();
        assert!(prompt.contains("今天是 "));
        assert!(prompt.contains("星期"));
        assert!(prompt.contains("年"));
        assert!(prompt.contains("search_stock_any"));
        assert!(prompt.contains("不构成投资建议"));
    }

    #[test]
    fn test_plan_summary_and_step_message_format() {
        let goals = vec!["搜索代码".to_string(), "查行情".to_string()];
        let summary = plan_summary(&goals);
        assert!(summary.starts_with("研究计划（共 2 步）：\n  1. 搜索代码\n  2. 查行情"));
        assert!(summary.ends_with("下面将只给出当前需要完成的那一步。"));

        let msg = step_message(2, 3, "查行情");
        assert!(msg.starts_with("【仅完成第 2/3 步】查行情\n\n"));
        assert!(msg.contains("不要为后续步骤调用工具"));
    }
}
