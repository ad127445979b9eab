//! 计划执行式研究代理。
//!
//! 一次 [`ResearchAgent::run`] 分三个阶段：
//! 1. 规划：把用户问题拆成步骤列表（解析失败退化为单步）；
//! 2. 执行：逐步驱动模型调用工具，批次内可并行，软限流与
//!    无进展检测由 [`Scratchpad`] 支撑；
//! 3. 综合：注入收尾提示生成最终回答，可选自校验一轮。
//!
//! 过程事件经 [`AgentEvent`] 通道上报，调用轨迹按需落盘为 JSONL。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use finsage_core::types::{AgentEvent, ChatMessage, LLMResponse, ToolCallRequest};
use finsage_core::{Config, Paths, Result};
use finsage_providers::{create_provider, Provider};
use finsage_storage::write_scratchpad_log;
use finsage_tools::{is_transient, safe_truncate, MarketData, ToolRegistry};

use crate::parallel::{can_parallelize, execute_tools_parallel, invoke_tool};
use crate::prompts::{
    parse_plan, plan_summary, step_message, system_prompt, FINAL_ANSWER_PROMPT,
    LOOP_DETECTED_PROMPT, PLANNING_SYSTEM_PROMPT, SELF_VALIDATION_PROMPT,
};
use crate::scratchpad::Scratchpad;

/// 多轮对话历史保留的消息条数（只存 user/assistant，不存工具轨迹）。
const MAX_HISTORY_MESSAGES: usize = 20;
/// LLM 调用重试次数与首次退避。
const LLM_RETRY_ATTEMPTS: u32 = 3;
const LLM_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
/// 工具结果在事件里的预览长度（字符数）。
const RESULT_PREVIEW_CHARS: usize = 500;

pub struct ResearchAgent {
    config: Config,
    paths: Paths,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    schemas: Vec<Value>,
}

impl ResearchAgent {
    pub fn new(config: Config) -> Result<Self> {
        let paths = Paths::new();
        let provider = create_provider(&config)?;
        let market = Arc::new(MarketData::new(config.fetch.clone()));
        let tools = Arc::new(ToolRegistry::from_config(&config, market));
        let schemas = tools.openai_schemas();
        debug!(
            provider = %config.provider,
            tools = tools.len(),
            "研究代理初始化完成"
        );
        Ok(Self {
            config,
            paths,
            provider,
            tools,
            schemas,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        config: Config,
        paths: Paths,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let schemas = tools.openai_schemas();
        Self {
            config,
            paths,
            provider,
            tools,
            schemas,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tools
    }

    /// 处理一个研究问题，过程事件发往 `events`，返回最终回答。
    ///
    /// 传入 `history` 时作为多轮上下文使用，并把本轮的
    /// (user, assistant) 消息追加回去。只有 LLM 调用失败会向外
    /// 传播，工具失败与日志写盘失败都消化在内部。
    pub async fn run(
        &self,
        query: &str,
        mut history: Option<&mut Vec<ChatMessage>>,
        events: &mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<String> {
        let mut scratchpad = Scratchpad::new(query, self.config.agent.max_calls_per_tool);
        let log_path = self.new_log_path();

        // 本轮上下文：系统提示词 + 多轮历史（如有）+ 当前问题
        let mut ctx = vec![ChatMessage::system(&system_prompt())];
        if let Some(h) = history.as_deref() {
            ctx.extend(h.iter().cloned());
        }
        ctx.push(ChatMessage::user(query));
        if let Some(h) = history.as_deref_mut() {
            trim_history(h);
        }

        // ---------- 阶段一：规划 ----------
        let _ = events.send(AgentEvent::Thinking {
            iteration: 1,
            phase: Some("planning".to_string()),
            step: None,
            step_goal: None,
        });
        let planning = [
            ChatMessage::system(PLANNING_SYSTEM_PROMPT),
            ChatMessage::user(query),
        ];
        let plan_response = self.chat_with_retry(&planning, &[]).await?;
        let mut steps = parse_plan(plan_response.content.as_deref().unwrap_or(""));
        if steps.is_empty() {
            // 解析失败或空计划时退化为单步，围绕原始问题执行
            let fallback = query.trim();
            steps = vec![if fallback.is_empty() {
                "回答用户问题".to_string()
            } else {
                fallback.to_string()
            }];
        }
        let n_steps = steps.len();
        info!(n_steps, "研究计划就绪");
        let _ = events.send(AgentEvent::Plan {
            steps: steps.clone(),
            n_steps,
        });

        // 注入一次全局计划摘要，每步再单独强调「仅完成当前步」
        ctx.push(ChatMessage::user(&plan_summary(&steps)));

        // ---------- 阶段二：按步骤执行 ----------
        'steps: for (step_index, goal) in steps.iter().enumerate() {
            let k = step_index + 1;
            debug!(step = k, goal = %goal, "执行步骤");
            ctx.push(ChatMessage::user(&step_message(k, n_steps, goal)));

            let mut step_iteration = 0;
            while step_iteration < self.config.agent.max_iterations {
                step_iteration += 1;
                let _ = events.send(AgentEvent::Thinking {
                    iteration: k as u32,
                    phase: None,
                    step: Some(k),
                    step_goal: Some(goal.clone()),
                });

                let LLMResponse {
                    content, tool_calls, ..
                } = self.chat_with_retry(&ctx, &self.schemas).await?;
                if tool_calls.is_empty() {
                    ctx.push(ChatMessage::assistant(content.as_deref().unwrap_or("")));
                    break;
                }
                ctx.push(ChatMessage::assistant_with_tools(content, tool_calls.clone()));

                // 全部可并行且均未触软限时并行执行，否则逐个串行
                let use_parallel = self.config.agent.enable_parallel_tools
                    && can_parallelize(&tool_calls, &self.tools)
                    && tool_calls
                        .iter()
                        .all(|tc| scratchpad.can_call_tool(&tc.name, &tc.arguments).is_ok());

                let mut tool_messages = if use_parallel {
                    self.run_batch_parallel(&tool_calls, &mut scratchpad, k, goal, events)
                        .await
                } else {
                    self.run_batch_serial(&tool_calls, &mut scratchpad, k, goal, events)
                        .await
                };
                ctx.append(&mut tool_messages);

                if self.config.agent.enable_loop_detection {
                    let no_progress = scratchpad.is_loop_no_progress(
                        self.config.agent.loop_window,
                        self.config.agent.failure_threshold,
                    );
                    let cap_reached =
                        scratchpad.total_calls() >= self.config.agent.max_total_tool_calls;
                    if no_progress || cap_reached {
                        let message = abort_message(no_progress);
                        info!(
                            total_calls = scratchpad.total_calls(),
                            no_progress, "触发循环检测，放弃剩余步骤进入收尾"
                        );
                        let _ = events.send(AgentEvent::ToolWarning {
                            tool: String::new(),
                            message: message.to_string(),
                        });
                        ctx.push(ChatMessage::user(LOOP_DETECTED_PROMPT));
                        break 'steps;
                    }
                }
            }
        }

        // ---------- 阶段三：综合回答 ----------
        ctx.push(ChatMessage::user(FINAL_ANSWER_PROMPT));
        let _ = events.send(AgentEvent::Thinking {
            iteration: (n_steps + 1) as u32,
            phase: Some("final_answer".to_string()),
            step: None,
            step_goal: None,
        });
        let final_response = self.chat_with_retry(&ctx, &[]).await?;
        let mut final_answer = final_response.content.unwrap_or_default();

        // 可选自校验：让模型基于已获取的数据自检是否充分
        if self.config.agent.enable_self_validation {
            ctx.push(ChatMessage::assistant(&final_answer));
            ctx.push(ChatMessage::user(SELF_VALIDATION_PROMPT));
            let _ = events.send(AgentEvent::Thinking {
                iteration: (n_steps + 1) as u32,
                phase: Some("self_validation".to_string()),
                step: None,
                step_goal: None,
            });
            let second = self.chat_with_retry(&ctx, &[]).await?;
            if let Some(content) = second.content {
                if !content.is_empty() {
                    final_answer = content;
                }
            }
        }

        let _ = events.send(AgentEvent::Answer {
            content: final_answer.clone(),
        });

        if let Some(h) = history.as_deref_mut() {
            h.push(ChatMessage::user(query));
            h.push(ChatMessage::assistant(&final_answer));
            trim_history(h);
        }

        debug!("{}", scratchpad.summary());

        if let Some(path) = log_path {
            if let Err(e) = write_scratchpad_log(
                &path,
                scratchpad.query(),
                scratchpad.records(),
                Some(&final_answer),
            ) {
                debug!(path = %path.display(), error = %e, "Scratchpad 日志写入失败");
            }
        }

        Ok(final_answer)
    }

    /// 并行批次：先上报全部 ToolStart，再整批执行。
    /// 调用前已通过软限流预检，这里不再逐个检查。
    async fn run_batch_parallel(
        &self,
        tool_calls: &[ToolCallRequest],
        scratchpad: &mut Scratchpad,
        step: usize,
        goal: &str,
        events: &mpsc::UnboundedSender<AgentEvent>,
    ) -> Vec<ChatMessage> {
        for tc in tool_calls {
            let _ = events.send(AgentEvent::ToolStart {
                tool: tc.name.clone(),
                args: tc.arguments.clone(),
                step,
                step_goal: goal.to_string(),
            });
        }

        let max_workers = (2 + tool_calls.len()).min(8);
        let outcomes = execute_tools_parallel(
            tool_calls,
            &self.tools,
            max_workers,
            Duration::from_secs(self.config.agent.parallel_batch_timeout_secs),
        )
        .await;

        let mut tool_messages = Vec::with_capacity(tool_calls.len());
        for (tc, outcome) in tool_calls.iter().zip(outcomes) {
            let result_str = match outcome.error {
                Some(error) => {
                    scratchpad.add_failure(&tc.name, tc.arguments.clone(), error.clone());
                    format!("工具执行失败: {}", error)
                }
                None => {
                    scratchpad.add_success(&tc.name, tc.arguments.clone(), outcome.result.clone());
                    outcome.result
                }
            };
            let _ = events.send(AgentEvent::ToolEnd {
                tool: tc.name.clone(),
                result: preview(&result_str, RESULT_PREVIEW_CHARS),
                step,
                step_goal: goal.to_string(),
            });
            tool_messages.push(ChatMessage::tool_result(&tc.id, &result_str));
        }
        tool_messages
    }

    /// 串行批次：逐个软限流检查后执行。
    /// 被跳过或未注册的调用不计入台账，但仍回给模型一条结果。
    async fn run_batch_serial(
        &self,
        tool_calls: &[ToolCallRequest],
        scratchpad: &mut Scratchpad,
        step: usize,
        goal: &str,
        events: &mpsc::UnboundedSender<AgentEvent>,
    ) -> Vec<ChatMessage> {
        let mut tool_messages = Vec::with_capacity(tool_calls.len());
        for tc in tool_calls {
            let _ = events.send(AgentEvent::ToolStart {
                tool: tc.name.clone(),
                args: tc.arguments.clone(),
                step,
                step_goal: goal.to_string(),
            });

            let result_str = match scratchpad.can_call_tool(&tc.name, &tc.arguments) {
                Err(warning) => {
                    let _ = events.send(AgentEvent::ToolWarning {
                        tool: tc.name.clone(),
                        message: warning.clone(),
                    });
                    format!("跳过: {}", warning)
                }
                Ok(()) => match self.tools.get(&tc.name) {
                    None => format!("未找到工具: {}", tc.name),
                    Some(tool) => match invoke_tool(tool.as_ref(), tc.arguments.clone()).await {
                        Ok(result) => {
                            scratchpad.add_success(&tc.name, tc.arguments.clone(), result.clone());
                            result
                        }
                        Err(e) => {
                            let error = e.to_string();
                            scratchpad.add_failure(&tc.name, tc.arguments.clone(), error.clone());
                            format!("工具执行失败: {}", error)
                        }
                    },
                },
            };

            let _ = events.send(AgentEvent::ToolEnd {
                tool: tc.name.clone(),
                result: preview(&result_str, RESULT_PREVIEW_CHARS),
                step,
                step_goal: goal.to_string(),
            });
            tool_messages.push(ChatMessage::tool_result(&tc.id, &result_str));
        }
        tool_messages
    }

    /// 瞬时性错误指数退避重试，其余错误立即向上传播。
    async fn chat_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<LLMResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.chat(messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < LLM_RETRY_ATTEMPTS && is_transient(&e) => {
                    let delay = LLM_RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM 调用失败，稍后重试"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 启用轨迹日志时生成本次会话的文件路径。
    fn new_log_path(&self) -> Option<PathBuf> {
        if !self.config.logging.log_scratchpad {
            return None;
        }
        let run_id = format!(
            "{}_{}",
            Local::now().format("%Y-%m-%d-%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Some(
            self.config
                .scratchpad_dir(&self.paths)
                .join(format!("{}.jsonl", run_id)),
        )
    }
}

/// 循环检测的收尾原因，无进展优先于调用数达上限。
fn abort_message(no_progress: bool) -> &'static str {
    if no_progress {
        "检测到无进展，将基于已有信息收尾"
    } else {
        "工具调用次数已达上限，将基于已有信息收尾"
    }
}

fn trim_history(history: &mut Vec<ChatMessage>) {
    if history.len() > MAX_HISTORY_MESSAGES {
        let excess = history.len() - MAX_HISTORY_MESSAGES;
        history.drain(..excess);
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", safe_truncate(s, max_chars))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finsage_core::Error;
    use finsage_tools::{Tool, ToolSpec};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockProvider {
        responses: Mutex<VecDeque<Result<LLMResponse>>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
    }

    impl MockProvider {
        fn new(responses: Vec<Result<LLMResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request_messages(&self, idx: usize) -> Vec<ChatMessage> {
            self.requests.lock().unwrap()[idx].0.clone()
        }

        fn request_tool_count(&self, idx: usize) -> usize {
            self.requests.lock().unwrap()[idx].1
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.len()));
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => response,
                None => Ok(LLMResponse {
                    content: Some("（脚本响应耗尽）".to_string()),
                    finish_reason: "stop".to_string(),
                    ..Default::default()
                }),
            }
        }
    }

    fn text(content: &str) -> Result<LLMResponse> {
        Ok(LLMResponse {
            content: Some(content.to_string()),
            finish_reason: "stop".to_string(),
            ..Default::default()
        })
    }

    fn tool_calls(calls: &[(&str, &str, Value)]) -> Result<LLMResponse> {
        Ok(LLMResponse {
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.clone(),
                })
                .collect(),
            finish_reason: "tool_calls".to_string(),
            usage: Value::Null,
        })
    }

    struct ScriptedTool {
        name: &'static str,
        output: String,
        fail: bool,
        thread_safe: bool,
    }

    impl ScriptedTool {
        fn ok(name: &'static str, output: &str) -> Self {
            Self {
                name,
                output: output.to_string(),
                fail: false,
                thread_safe: true,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                output: String::new(),
                fail: true,
                thread_safe: true,
            }
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name,
                description: "测试工具",
                parameters: json!({"type": "object", "properties": {}}),
                read_only: true,
                thread_safe: self.thread_safe,
            }
        }

        async fn execute(&self, _params: Value) -> Result<String> {
            if self.fail {
                return Err(Error::Tool("数据源连接中断".to_string()));
            }
            Ok(self.output.clone())
        }
    }

    fn build_agent(
        config: Config,
        provider: Arc<MockProvider>,
        tools: Vec<ScriptedTool>,
    ) -> ResearchAgent {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool));
        }
        ResearchAgent::with_parts(
            config,
            Paths::with_base(std::env::temp_dir().join("finsage-agent-test")),
            provider,
            Arc::new(registry),
        )
    }

    async fn run_collect(
        agent: &ResearchAgent,
        query: &str,
        history: Option<&mut Vec<ChatMessage>>,
    ) -> (Result<String>, Vec<AgentEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = agent.run(query, history, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        (result, events)
    }

    fn message_texts(messages: &[ChatMessage]) -> Vec<String> {
        messages.iter().map(|m| m.text().to_string()).collect()
    }

    #[tokio::test]
    async fn test_full_run_plan_execute_answer() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "搜索茅台代码"}, {"goal": "获取实时行情"}]}"#),
            tool_calls(&[("c1", "search_stock", json!({"keyword": "茅台"}))]),
            text("已找到 600519"),
            text("行情已在上一步给出"),
            text("草稿回答"),
            text("贵州茅台分析完毕"),
        ]);
        let agent = build_agent(
            Config::default(),
            provider.clone(),
            vec![ScriptedTool::ok("search_stock", "搜索结果: 600519 贵州茅台")],
        );

        let (result, events) = run_collect(&agent, "分析贵州茅台", None).await;
        assert_eq!(result.unwrap(), "贵州茅台分析完毕");

        // 规划为纯对话调用，执行阶段携带工具 schema
        assert_eq!(provider.request_tool_count(0), 0);
        assert_eq!(provider.request_tool_count(1), 1);
        assert_eq!(provider.request_count(), 6);

        match &events[1] {
            AgentEvent::Plan { steps, n_steps } => {
                assert_eq!(steps, &vec!["搜索茅台代码".to_string(), "获取实时行情".to_string()]);
                assert_eq!(*n_steps, 2);
            }
            other => panic!("期望 Plan 事件，得到 {:?}", other),
        }
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolEnd { tool, result, .. }
                if tool == "search_stock" && result == "搜索结果: 600519 贵州茅台"
        )));
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Answer { content }) if content == "贵州茅台分析完毕"
        ));

        // 综合阶段：倒数第二个请求以 FINAL_ANSWER 收尾，最后一个以自检提示收尾
        let final_texts = message_texts(&provider.request_messages(4));
        assert_eq!(final_texts.last().map(String::as_str), Some(FINAL_ANSWER_PROMPT));
        let validate_texts = message_texts(&provider.request_messages(5));
        assert_eq!(
            validate_texts.last().map(String::as_str),
            Some(SELF_VALIDATION_PROMPT)
        );
        assert!(validate_texts.iter().any(|t| t == "草稿回答"));
    }

    #[tokio::test]
    async fn test_empty_plan_falls_back_to_single_step() {
        let provider = MockProvider::new(vec![
            text("{}"),
            text("直接回答"),
            text("最终回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_self_validation = false;
        let agent = build_agent(config, provider.clone(), vec![]);

        let (result, events) = run_collect(&agent, "  今天大盘怎么样  ", None).await;
        assert_eq!(result.unwrap(), "最终回答");
        match &events[1] {
            AgentEvent::Plan { steps, n_steps } => {
                assert_eq!(steps, &vec!["今天大盘怎么样".to_string()]);
                assert_eq!(*n_steps, 1);
            }
            other => panic!("期望 Plan 事件，得到 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_self_validation_empty_keeps_draft() {
        let provider = MockProvider::new(vec![
            text("{}"),
            text("ok"),
            text("草稿回答"),
            Ok(LLMResponse::default()), // 自检返回空内容
        ]);
        let agent = build_agent(Config::default(), provider, vec![]);
        let (result, _) = run_collect(&agent, "问题", None).await;
        assert_eq!(result.unwrap(), "草稿回答");
    }

    #[tokio::test]
    async fn test_serial_duplicate_call_skipped() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "查行情"}]}"#),
            tool_calls(&[
                ("c1", "get_stock_realtime", json!({"code": "600519"})),
                ("c2", "get_stock_realtime", json!({"code": "600519"})),
            ]),
            text("行情拿到了"),
            text("回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = false;
        let agent = build_agent(
            config,
            provider.clone(),
            vec![ScriptedTool::ok("get_stock_realtime", "行情数据: 1688元")],
        );

        let (result, events) = run_collect(&agent, "茅台行情", None).await;
        result.unwrap();

        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolWarning { tool, message }
                if tool == "get_stock_realtime"
                    && message == "工具 get_stock_realtime 已使用相同参数调用过"
        )));
        let ends: Vec<&AgentEvent> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolEnd { .. }))
            .collect();
        assert_eq!(ends.len(), 2);
        match ends[1] {
            AgentEvent::ToolEnd { result, .. } => {
                assert_eq!(result, "跳过: 工具 get_stock_realtime 已使用相同参数调用过")
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_serial_unknown_tool_reported_to_model() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "查数据"}]}"#),
            tool_calls(&[("c1", "ghost_tool", json!({"x": 1}))]),
            text("知道了"),
            text("回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = false;
        let agent = build_agent(config, provider.clone(), vec![]);

        let (result, events) = run_collect(&agent, "问题", None).await;
        result.unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolEnd { result, .. } if result == "未找到工具: ghost_tool"
        )));
        // 未注册的调用也要给模型回一条 tool 消息
        let texts = message_texts(&provider.request_messages(2));
        assert!(texts.iter().any(|t| t == "未找到工具: ghost_tool"));
    }

    #[tokio::test]
    async fn test_no_progress_abort_skips_remaining_steps() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "搜索代码"}, {"goal": "获取行情"}]}"#),
            tool_calls(&[
                ("c1", "search_stock", json!({"keyword": "a"})),
                ("c2", "search_stock", json!({"keyword": "b"})),
                ("c3", "search_stock", json!({"keyword": "c"})),
            ]),
            text("收尾草稿"),
            text("收尾回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = true;
        let agent = build_agent(
            config,
            provider.clone(),
            vec![ScriptedTool::failing("search_stock")],
        );

        let (result, events) = run_collect(&agent, "找一只股票", None).await;
        assert_eq!(result.unwrap(), "收尾回答");

        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolWarning { tool, message }
                if tool.is_empty() && message == "检测到无进展，将基于已有信息收尾"
        )));
        // 第 2 步被放弃，不再有对应的思考事件
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::Thinking { step: Some(2), .. })));
        // 规划 + 第 1 步 + 综合 + 自检，共 4 次调用
        assert_eq!(provider.request_count(), 4);

        // 收尾请求同时携带循环提示与综合提示
        let final_texts = message_texts(&provider.request_messages(2));
        assert!(final_texts.iter().any(|t| t == LOOP_DETECTED_PROMPT));
        assert_eq!(final_texts.last().map(String::as_str), Some(FINAL_ANSWER_PROMPT));
    }

    #[tokio::test]
    async fn test_call_cap_abort_uses_cap_message() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "查两只股票"}]}"#),
            tool_calls(&[
                ("c1", "get_stock_realtime", json!({"code": "600519"})),
                ("c2", "get_stock_realtime", json!({"code": "000858"})),
            ]),
            text("收尾"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = false;
        config.agent.max_total_tool_calls = 2;
        let agent = build_agent(
            config,
            provider.clone(),
            vec![ScriptedTool::ok("get_stock_realtime", "行情数据: 正常")],
        );

        let (result, events) = run_collect(&agent, "对比茅台五粮液", None).await;
        result.unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolWarning { tool, message }
                if tool.is_empty() && message == "工具调用次数已达上限，将基于已有信息收尾"
        )));
    }

    #[test]
    fn test_abort_message_precedence() {
        assert_eq!(abort_message(true), "检测到无进展，将基于已有信息收尾");
        assert_eq!(abort_message(false), "工具调用次数已达上限，将基于已有信息收尾");
    }

    #[tokio::test]
    async fn test_parallel_batch_starts_before_any_end() {
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "同时查两只"}]}"#),
            tool_calls(&[
                ("c1", "get_stock_realtime", json!({"code": "600519"})),
                ("c2", "get_stock_info", json!({"code": "600519"})),
            ]),
            text("都拿到了"),
            text("回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_self_validation = false;
        let agent = build_agent(
            config,
            provider.clone(),
            vec![
                ScriptedTool::ok("get_stock_realtime", "行情数据: 1688元"),
                ScriptedTool::ok("get_stock_info", "公司信息: 白酒龙头"),
            ],
        );

        let (result, events) = run_collect(&agent, "茅台全貌", None).await;
        result.unwrap();

        let first_end = events
            .iter()
            .position(|e| matches!(e, AgentEvent::ToolEnd { .. }))
            .unwrap();
        let starts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, AgentEvent::ToolStart { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(starts.len(), 2);
        assert!(starts.iter().all(|i| *i < first_end));

        // 结果与入参顺序一致
        let ends: Vec<&AgentEvent> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolEnd { .. }))
            .collect();
        match (ends[0], ends[1]) {
            (
                AgentEvent::ToolEnd { tool: t1, result: r1, .. },
                AgentEvent::ToolEnd { tool: t2, result: r2, .. },
            ) => {
                assert_eq!(t1, "get_stock_realtime");
                assert_eq!(r1, "行情数据: 1688元");
                assert_eq!(t2, "get_stock_info");
                assert_eq!(r2, "公司信息: 白酒龙头");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = MockProvider::new(vec![Err(Error::Provider(
            "invalid api key".to_string(),
        ))]);
        let agent = build_agent(Config::default(), provider.clone(), vec![]);
        let (result, _) = run_collect(&agent, "问题", None).await;
        assert!(result.is_err());
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_provider_errors_retried() {
        let provider = MockProvider::new(vec![
            Err(Error::Provider("connection reset by peer".to_string())),
            Err(Error::Provider("read timeout".to_string())),
            text("{}"),
            text("ok"),
            text("最终回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_self_validation = false;
        let agent = build_agent(config, provider.clone(), vec![]);

        let (result, _) = run_collect(&agent, "问题", None).await;
        assert_eq!(result.unwrap(), "最终回答");
        // 规划阶段重试 3 次 + 执行 1 次 + 综合 1 次
        assert_eq!(provider.request_count(), 5);
    }

    #[tokio::test]
    async fn test_history_used_and_trimmed() {
        let provider = MockProvider::new(vec![
            text("{}"),
            text("直接说"),
            text("新回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_self_validation = false;
        let agent = build_agent(config, provider.clone(), vec![]);

        let mut history: Vec<ChatMessage> = (1..=19)
            .map(|i| {
                if i % 2 == 1 {
                    ChatMessage::user(&format!("旧消息{}", i))
                } else {
                    ChatMessage::assistant(&format!("旧消息{}", i))
                }
            })
            .collect();

        let (result, _) = run_collect(&agent, "接着上次说", Some(&mut history)).await;
        assert_eq!(result.unwrap(), "新回答");

        // 19 + 2 = 21，裁剪到 20，最旧的一条被丢弃
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].text(), "旧消息2");
        assert_eq!(history[18].text(), "接着上次说");
        assert_eq!(history[19].text(), "新回答");
        assert_eq!(history[19].role, "assistant");

        // 规划请求不带历史，执行请求带上全部历史
        assert_eq!(provider.request_messages(0).len(), 2);
        // system + 19 条历史 + 当前问题 + 计划摘要 + 步骤指令
        assert_eq!(provider.request_messages(1).len(), 23);
    }

    #[tokio::test]
    async fn test_tool_result_preview_truncated() {
        let long_output = "数".repeat(600);
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "拉长数据"}]}"#),
            tool_calls(&[("c1", "get_stock_history", json!({"code": "600519"}))]),
            text("拿到了"),
            text("回答"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = false;
        let agent = build_agent(
            config,
            provider.clone(),
            vec![ScriptedTool::ok("get_stock_history", &long_output)],
        );

        let (result, events) = run_collect(&agent, "历史行情", None).await;
        result.unwrap();

        let preview = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolEnd { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(preview.chars().count(), 503);
        assert!(preview.ends_with("..."));

        // 回给模型的完整结果不截断
        let texts = message_texts(&provider.request_messages(2));
        assert!(texts.iter().any(|t| t.chars().count() == 600));
    }

    #[tokio::test]
    async fn test_scratchpad_log_written() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![
            text(r#"{"steps": [{"goal": "查行情"}]}"#),
            tool_calls(&[("c1", "get_stock_realtime", json!({"code": "600519"}))]),
            text("好了"),
            text("最终结论"),
        ]);
        let mut config = Config::default();
        config.agent.enable_parallel_tools = false;
        config.agent.enable_self_validation = false;
        config.logging.log_scratchpad = true;
        config.logging.log_dir = dir.path().to_string_lossy().to_string();
        let agent = build_agent(
            config,
            provider,
            vec![ScriptedTool::ok("get_stock_realtime", "行情数据: 1688元")],
        );

        let (result, _) = run_collect(&agent, "茅台行情", None).await;
        result.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().to_string();
        let name_re = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{6}_[0-9a-f]{8}\.jsonl$").unwrap();
        assert!(name_re.is_match(&name), "意外的日志文件名: {}", name);

        let content = std::fs::read_to_string(&entries[0]).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "init");
        assert_eq!(lines[0]["query"], "茅台行情");
        assert_eq!(lines[1]["type"], "tool_result");
        assert_eq!(lines[1]["toolName"], "get_stock_realtime");
        assert_eq!(lines[1]["result"], "行情数据: 1688元");
        assert!(lines[1]["error"].is_null());
        assert_eq!(lines[2]["type"], "answer");
        assert_eq!(lines[2]["content"], "最终结论");
    }
}
