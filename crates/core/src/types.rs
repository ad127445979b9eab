use serde::{Deserialize, Serialize};
use tracing::warn;

/// A tool call request that serializes to the OpenAI-compatible format:
/// `{id, type: "function", function: {name, arguments}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Serialize for ToolCallRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &serde_json::json!({
            "name": self.name,
            "arguments": self.arguments.to_string()
        }))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolCallRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value.as_object().ok_or_else(|| serde::de::Error::custom("expected object"))?;

        let id = obj.get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        // Nested format: {id, type, function: {name, arguments}}
        if let Some(func) = obj.get("function").and_then(|v| v.as_object()) {
            let name = func.get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = match func.get("arguments") {
                Some(serde_json::Value::String(s)) => {
                    serde_json::from_str(s).unwrap_or_else(|e| {
                        warn!(error = %e, raw = %s, "Failed to parse tool call arguments as JSON, using empty object");
                        serde_json::Value::Object(serde_json::Map::new())
                    })
                }
                Some(v) => v.clone(),
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            return Ok(ToolCallRequest { id, name, arguments });
        }

        // Flat format: {id, name, arguments}
        let name = obj.get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = obj.get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        Ok(ToolCallRequest { id, name, arguments })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
    pub usage: serde_json::Value,
}

impl Default for LLMResponse {
    fn default() -> Self {
        Self {
            content: None,
            tool_calls: Vec::new(),
            finish_reason: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: serde_json::Value::String(content.unwrap_or_default()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_str().unwrap_or_default()
    }
}

/// One executed (or failed) tool call, as kept in the run scratchpad and
/// persisted to the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub result: String,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl ToolCallRecord {
    pub fn ok(tool_name: &str, args: serde_json::Value, result: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            args,
            result,
            error: None,
            timestamp: chrono::Local::now(),
        }
    }

    pub fn failed(tool_name: &str, args: serde_json::Value, error: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            args,
            result: String::new(),
            error: Some(error),
            timestamp: chrono::Local::now(),
        }
    }
}

/// Progress events emitted while the research agent works through a query.
/// Tagged so they can be rendered by the CLI or streamed over a wire as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// One planning/model-invocation tick. `phase` distinguishes planning,
    /// final_answer and self_validation ticks from per-step execution ticks.
    Thinking {
        iteration: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_goal: Option<String>,
    },
    Plan {
        steps: Vec<String>,
        n_steps: usize,
    },
    ToolStart {
        tool: String,
        args: serde_json::Value,
        step: usize,
        step_goal: String,
    },
    /// `result` carries a preview of at most 500 characters.
    ToolEnd {
        tool: String,
        result: String,
        step: usize,
        step_goal: String,
    },
    /// A tool call was skipped, or loop detection fired (`tool` empty then).
    ToolWarning {
        tool: String,
        message: String,
    },
    Answer {
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_serializes_to_openai_format() {
        let call = ToolCallRequest {
            id: "call_1".to_string(),
            name: "get_stock_realtime".to_string(),
            arguments: json!({"code": "600519"}),
        };
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["id"], "call_1");
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "get_stock_realtime");
        // arguments travel as a JSON string, per the OpenAI wire format
        let args: serde_json::Value =
            serde_json::from_str(v["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["code"], "600519");
    }

    #[test]
    fn test_tool_call_deserializes_nested_format() {
        let raw = json!({
            "id": "call_2",
            "type": "function",
            "function": {"name": "search_stock", "arguments": "{\"keyword\": \"茅台\"}"}
        });
        let call: ToolCallRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(call.name, "search_stock");
        assert_eq!(call.arguments["keyword"], "茅台");
    }

    #[test]
    fn test_tool_call_bad_arguments_fall_back_to_empty_object() {
        let raw = json!({
            "id": "call_3",
            "function": {"name": "get_hot_stocks", "arguments": "not json"}
        });
        let call: ToolCallRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn test_tool_call_deserializes_flat_format() {
        let raw = json!({"id": "c", "name": "get_macro_cpi", "arguments": {"months": 12}});
        let call: ToolCallRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(call.name, "get_macro_cpi");
        assert_eq!(call.arguments["months"], 12);
    }

    #[test]
    fn test_tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call_9", "ok");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(msg.text(), "ok");
    }

    #[test]
    fn test_agent_event_tagged_serialization() {
        let ev = AgentEvent::ToolStart {
            tool: "get_index_realtime".to_string(),
            args: json!({"code": "000001"}),
            step: 1,
            step_goal: "查大盘".to_string(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "tool_start");
        assert_eq!(v["tool"], "get_index_realtime");
        assert_eq!(v["step"], 1);
    }

    #[test]
    fn test_thinking_event_omits_absent_fields() {
        let ev = AgentEvent::Thinking {
            iteration: 1,
            phase: Some("planning".to_string()),
            step: None,
            step_goal: None,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "thinking");
        assert_eq!(v["phase"], "planning");
        assert!(v.get("step").is_none());
    }
}
