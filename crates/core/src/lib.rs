pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{AgentSettings, Config, FetchSettings, LoggingSettings, ToolSettings};
pub use error::{Error, Result};
pub use paths::Paths;
pub use types::{AgentEvent, ChatMessage, LLMResponse, ToolCallRecord, ToolCallRequest};
