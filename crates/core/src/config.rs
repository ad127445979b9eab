use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// 每个计划步骤内的最大推理轮数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_total_tool_calls")]
    pub max_total_tool_calls: usize,
    #[serde(default = "default_max_calls_per_tool")]
    pub max_calls_per_tool: usize,
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_true")]
    pub enable_self_validation: bool,
    #[serde(default = "default_true")]
    pub enable_loop_detection: bool,
    #[serde(default = "default_true")]
    pub enable_parallel_tools: bool,
    #[serde(default = "default_parallel_batch_timeout_secs")]
    pub parallel_batch_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_max_total_tool_calls() -> usize {
    14
}

fn default_max_calls_per_tool() -> usize {
    3
}

fn default_loop_window() -> usize {
    4
}

fn default_failure_threshold() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_parallel_batch_timeout_secs() -> u64 {
    45
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_total_tool_calls: default_max_total_tool_calls(),
            max_calls_per_tool: default_max_calls_per_tool(),
            loop_window: default_loop_window(),
            failure_threshold: default_failure_threshold(),
            enable_self_validation: default_true(),
            enable_loop_detection: default_true(),
            enable_parallel_tools: default_true(),
            parallel_batch_timeout_secs: default_parallel_batch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSettings {
    #[serde(default = "default_true")]
    pub enable_parallel_sources: bool,
    /// 串行降级时相邻数据源之间的间隔
    #[serde(default = "default_source_delay_ms")]
    pub source_delay_ms: u64,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

fn default_source_delay_ms() -> u64 {
    300
}

fn default_source_timeout_secs() -> u64 {
    8
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            enable_parallel_sources: default_true(),
            source_delay_ms: default_source_delay_ms(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSettings {
    #[serde(default = "default_true")]
    pub enable_stock_tools: bool,
    #[serde(default = "default_true")]
    pub enable_stock_hk_tools: bool,
    #[serde(default = "default_true")]
    pub enable_fund_tools: bool,
    #[serde(default = "default_true")]
    pub enable_futures_tools: bool,
    #[serde(default = "default_true")]
    pub enable_index_tools: bool,
    #[serde(default = "default_true")]
    pub enable_macro_tools: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enable_stock_tools: true,
            enable_stock_hk_tools: true,
            enable_fund_tools: true,
            enable_futures_tools: true,
            enable_index_tools: true,
            enable_macro_tools: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default)]
    pub log_scratchpad: bool,
    /// 为空时使用 ~/.finsage/scratchpads
    #[serde(default)]
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 为空时使用提供商目录中的默认模型
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub custom_base_url: String,
    #[serde(default)]
    pub custom_api_key: String,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            custom_base_url: String::new(),
            custom_api_key: String::new(),
            agent: AgentSettings::default(),
            fetch: FetchSettings::default(),
            tools: ToolSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_provider() -> String {
    "zhipu".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(key, value = other, "Unrecognized boolean env value, ignoring");
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_string(key: &str) -> Option<String> {
    let v = std::env::var(key).ok()?;
    let v = v.trim().to_string();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Environment variables override whatever the config file said.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("FINSAGE_PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = env_string("FINSAGE_MODEL") {
            self.model = v;
        }
        if let Some(v) = env_parse::<f32>("FINSAGE_TEMPERATURE") {
            self.temperature = v;
        }
        if let Some(v) = env_parse::<u32>("FINSAGE_MAX_TOKENS") {
            self.max_tokens = v;
        }
        if let Some(v) = env_string("CUSTOM_BASE_URL") {
            self.custom_base_url = v;
        }
        if let Some(v) = env_string("CUSTOM_API_KEY") {
            self.custom_api_key = v;
        }
        if let Some(v) = env_parse::<u32>("FINSAGE_MAX_ITERATIONS") {
            self.agent.max_iterations = v;
        }
        if let Some(v) = env_parse::<usize>("FINSAGE_MAX_TOTAL_TOOL_CALLS") {
            self.agent.max_total_tool_calls = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_SELF_VALIDATION") {
            self.agent.enable_self_validation = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_LOOP_DETECTION") {
            self.agent.enable_loop_detection = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_PARALLEL_TOOLS") {
            self.agent.enable_parallel_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_PARALLEL_SOURCES") {
            self.fetch.enable_parallel_sources = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_STOCK_TOOLS") {
            self.tools.enable_stock_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_STOCK_HK_TOOLS") {
            self.tools.enable_stock_hk_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_FUND_TOOLS") {
            self.tools.enable_fund_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_FUTURES_TOOLS") {
            self.tools.enable_futures_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_INDEX_TOOLS") {
            self.tools.enable_index_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_ENABLE_MACRO_TOOLS") {
            self.tools.enable_macro_tools = v;
        }
        if let Some(v) = env_bool("FINSAGE_LOG_SCRATCHPAD") {
            self.logging.log_scratchpad = v;
        }
        if let Some(v) = env_string("FINSAGE_SCRATCHPAD_DIR") {
            self.logging.log_dir = v;
        }
    }

    pub fn scratchpad_dir(&self, paths: &Paths) -> PathBuf {
        if self.logging.log_dir.is_empty() {
            paths.scratchpad_dir()
        } else {
            PathBuf::from(&self.logging.log_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider, "zhipu");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.max_total_tool_calls, 14);
        assert_eq!(config.agent.max_calls_per_tool, 3);
        assert_eq!(config.agent.loop_window, 4);
        assert_eq!(config.agent.failure_threshold, 3);
        assert!(config.agent.enable_parallel_tools);
        assert!(config.fetch.enable_parallel_sources);
        assert!(config.tools.enable_macro_tools);
        assert!(!config.logging.log_scratchpad);
    }

    #[test]
    fn test_partial_file_fills_with_defaults() {
        let raw = r#"{"provider": "deepseek", "agent": {"maxIterations": 5}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.provider, "deepseek");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.max_total_tool_calls, 14);
        assert!(config.tools.enable_stock_tools);
    }

    #[test]
    fn test_camel_case_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("maxTotalToolCalls"));
        assert!(json.contains("enableParallelSources"));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent.loop_window, config.agent.loop_window);
    }

    #[test]
    fn test_apply_env_overrides() {
        std::env::set_var("FINSAGE_MAX_ITERATIONS", "7");
        std::env::set_var("FINSAGE_ENABLE_SELF_VALIDATION", "false");
        let mut config = Config::default();
        config.apply_env();
        std::env::remove_var("FINSAGE_MAX_ITERATIONS");
        std::env::remove_var("FINSAGE_ENABLE_SELF_VALIDATION");
        assert_eq!(config.agent.max_iterations, 7);
        assert!(!config.agent.enable_self_validation);
    }

    #[test]
    fn test_scratchpad_dir_defaults_to_home() {
        let paths = Paths::with_base(PathBuf::from("/tmp/finsage-test"));
        let config = Config::default();
        assert_eq!(
            config.scratchpad_dir(&paths),
            PathBuf::from("/tmp/finsage-test/scratchpads")
        );
        let mut config = config;
        config.logging.log_dir = "/var/log/finsage".to_string();
        assert_eq!(config.scratchpad_dir(&paths), PathBuf::from("/var/log/finsage"));
    }
}
