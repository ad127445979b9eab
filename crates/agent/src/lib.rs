//! 金融研究代理：规划 → 按步执行工具 → 综合回答。
//!
//! [`ResearchAgent`] 驱动整个循环；[`Scratchpad`] 记录调用轨迹并
//! 提供软限流与无进展检测；[`parallel`] 负责批次内的并发执行；
//! [`prompts`] 集中全部中文提示词与计划解析。

pub mod parallel;
pub mod prompts;
pub mod runtime;
pub mod scratchpad;

pub use parallel::{can_parallelize, execute_tools_parallel, ToolOutcome};
pub use prompts::{parse_plan, system_prompt};
pub use runtime::ResearchAgent;
pub use scratchpad::Scratchpad;
