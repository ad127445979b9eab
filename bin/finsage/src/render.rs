//! Agent 事件流的终端渲染。
//!
//! query 与 chat 共用同一渲染器：按事件增量输出规划、步骤标题、
//! 工具调用与最终答案。步骤标题只在进入新步骤时打印一次。

use finsage_core::AgentEvent;
use finsage_tools::safe_truncate;
use serde_json::Value;

/// 工具的中文显示名称，未收录的直接展示原名。
pub fn tool_display_name(tool: &str) -> &str {
    match tool {
        "search_stock" => "搜索股票（A股）",
        "search_stock_any" => "智能搜索股票（A股/港股）",
        "get_stock_realtime" => "获取股票实时行情",
        "get_stock_history" => "获取股票历史数据",
        "get_stock_info" => "获取股票基本信息",
        "get_stock_financials" => "获取核心财务指标",
        "get_hot_stocks" => "获取热门股票",
        "get_industry_boards" => "获取行业板块",
        "get_industry_board_detail" => "获取行业板块详情（涨跌幅+估值）",
        "get_concept_boards" => "获取概念板块",
        "get_concept_stocks" => "获取概念板块成分股",
        "search_stock_hk" => "搜索港股",
        "get_stock_hk_realtime" => "获取港股实时行情",
        "get_etf_realtime" => "获取ETF实时行情",
        "get_etf_history" => "获取ETF历史数据",
        "get_futures_realtime" => "获取期货实时行情",
        "get_index_realtime" => "获取指数实时行情",
        "get_index_history" => "获取指数历史数据",
        "get_macro_cpi" => "获取CPI数据",
        "get_macro_gdp" => "获取GDP数据",
        "get_money_supply" => "获取货币供应量",
        other => other,
    }
}

pub struct EventRenderer {
    /// 为 false 时不展示工具调用明细，只保留规划、警告与最终答案。
    verbose: bool,
    current_step: Option<usize>,
    total_steps: Option<usize>,
}

impl EventRenderer {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            current_step: None,
            total_steps: None,
        }
    }

    pub fn render(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Thinking {
                iteration,
                phase,
                step,
                step_goal,
            } => match phase.as_deref() {
                Some("planning") => println!("🧠 正在拆解任务..."),
                Some("final_answer") => println!("\n💡 整理最终回答..."),
                _ => {
                    if let (Some(step), Some(goal)) = (step, step_goal) {
                        if self.current_step != Some(*step) {
                            self.current_step = Some(*step);
                            match self.total_steps {
                                Some(total) => {
                                    println!("\n📌 第 {}/{} 步 · {}", step, total, goal)
                                }
                                None => println!("\n📌 第 {} 步 · {}", step, goal),
                            }
                        }
                    } else {
                        println!("[迭代 {}] 思考中...", iteration);
                    }
                }
            },
            AgentEvent::Plan { steps, n_steps } => {
                self.total_steps = Some(*n_steps);
                println!("📋 任务规划（共 {} 步）", n_steps);
                for (i, goal) in steps.iter().enumerate() {
                    println!("  {}. {}", i + 1, goal);
                }
            }
            AgentEvent::ToolStart { tool, args, .. } => {
                if self.verbose {
                    let summary = args_summary(args);
                    if summary.is_empty() {
                        println!("  🔧 {}", tool_display_name(tool));
                    } else {
                        println!("  🔧 {} ({})", tool_display_name(tool), summary);
                    }
                }
            }
            AgentEvent::ToolEnd { result, .. } => {
                if self.verbose {
                    println!("  ✓ 结果: {}", preview(result, 100));
                }
            }
            AgentEvent::ToolWarning { message, .. } => {
                println!("  ⚠ {}", message);
            }
            AgentEvent::Answer { content } => {
                println!();
                println!("💡 分析结果");
                println!();
                println!("{}", content);
            }
        }
    }
}

/// 把工具参数压成 `k=v, k=v` 单行摘要，超过 50 字符截断。
fn args_summary(args: &Value) -> String {
    let Some(map) = args.as_object() else {
        return String::new();
    };
    let joined = map
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ");
    preview(&joined, 50)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", safe_truncate(text, max_chars))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_known_and_unknown() {
        assert_eq!(tool_display_name("get_stock_realtime"), "获取股票实时行情");
        assert_eq!(tool_display_name("no_such_tool"), "no_such_tool");
    }

    #[test]
    fn test_args_summary_strips_string_quotes() {
        let summary = args_summary(&json!({"code": "600519", "days": 30}));
        assert_eq!(summary, "code=600519, days=30");
    }

    #[test]
    fn test_args_summary_truncates_long_args() {
        let summary = args_summary(&json!({"keyword": "茅".repeat(80)}));
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 53);
    }

    #[test]
    fn test_args_summary_non_object_is_empty() {
        assert_eq!(args_summary(&json!(["a", "b"])), "");
    }
}
