//! 工具注册表：按配置分类装配，供 agent 查找与执行。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use finsage_core::{Config, Error, Result};

use crate::market::MarketData;
use crate::{boards, fund, futures, hk, index, macro_econ, stock, Tool, ToolSpec};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    /// 分类展示用（类别名，工具名列表），仅 `from_config` 填充。
    categories: Vec<(&'static str, Vec<&'static str>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置开关装配全部内置工具。
    pub fn from_config(config: &Config, market: Arc<MarketData>) -> Self {
        let mut registry = Self::new();
        let flags = &config.tools;

        if flags.enable_stock_tools {
            let tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(stock::SearchStockTool::new(market.clone())),
                Arc::new(stock::SearchStockAnyTool::new(market.clone())),
                Arc::new(stock::StockRealtimeTool::new(market.clone())),
                Arc::new(stock::StockHistoryTool::new(market.clone())),
                Arc::new(stock::StockInfoTool::new(market.clone())),
                Arc::new(stock::StockFinancialsTool::new(market.clone())),
                Arc::new(stock::HotStocksTool::new(market.clone())),
                Arc::new(boards::IndustryBoardsTool::new(market.clone())),
                Arc::new(boards::IndustryBoardDetailTool::new(market.clone())),
                Arc::new(boards::ConceptBoardsTool::new(market.clone())),
                Arc::new(boards::ConceptStocksTool::new(market.clone())),
            ];
            registry.register_category("股票数据 (A股)", tools);
        }
        if flags.enable_stock_hk_tools {
            let tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(hk::SearchStockHkTool::new(market.clone())),
                Arc::new(hk::StockHkRealtimeTool::new(market.clone())),
            ];
            registry.register_category("股票数据 (港股)", tools);
        }
        if flags.enable_fund_tools {
            let tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(fund::EtfRealtimeTool::new(market.clone())),
                Arc::new(fund::EtfHistoryTool::new(market.clone())),
            ];
            registry.register_category("基金数据", tools);
        }
        if flags.enable_futures_tools {
            let tools: Vec<Arc<dyn Tool>> =
                vec![Arc::new(futures::FuturesRealtimeTool::new(market.clone()))];
            registry.register_category("期货数据", tools);
        }
        if flags.enable_index_tools {
            let tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(index::IndexRealtimeTool::new(market.clone())),
                Arc::new(index::IndexHistoryTool::new(market.clone())),
            ];
            registry.register_category("指数数据", tools);
        }
        if flags.enable_macro_tools {
            let tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(macro_econ::MacroCpiTool::new(market.clone())),
                Arc::new(macro_econ::MacroGdpTool::new(market.clone())),
                Arc::new(macro_econ::MoneySupplyTool::new(market)),
            ];
            registry.register_category("宏观数据", tools);
        }

        debug!(count = registry.len(), "工具注册完成");
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name.to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    fn register_category(&mut self, label: &'static str, tools: Vec<Arc<dyn Tool>>) {
        let names: Vec<&'static str> = tools.iter().map(|t| t.spec().name).collect();
        for tool in tools {
            self.register(tool);
        }
        self.categories.push((label, names));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 注册顺序的工具名。
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.spec())
            .collect()
    }

    /// 发给 LLM 的 function-call schema 列表。
    pub fn openai_schemas(&self) -> Vec<Value> {
        self.specs().iter().map(ToolSpec::to_openai_schema).collect()
    }

    /// 分类描述文本，供 CLI 展示。
    pub fn describe(&self) -> String {
        let mut out = Vec::new();
        if self.categories.is_empty() {
            for spec in self.specs() {
                out.push(format!("  - {}: {}", spec.name, spec.description));
            }
        } else {
            for (label, names) in &self.categories {
                out.push(format!("\n{}:", label));
                for name in names {
                    if let Some(tool) = self.tools.get(*name) {
                        let spec = tool.spec();
                        out.push(format!("  - {}: {}", spec.name, spec.description));
                    }
                }
            }
        }
        out.join("\n")
    }

    /// 校验并执行指定工具。
    pub async fn execute(&self, name: &str, params: Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("未找到工具: {}", name)))?;
        tool.validate(&params)?;
        tool.execute(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo",
                description: "回显参数",
                parameters: json!({"type": "object", "properties": {"msg": {"type": "string"}}}),
                read_only: true,
                thread_safe: true,
            }
        }

        async fn execute(&self, params: Value) -> Result<String> {
            Ok(params["msg"].as_str().unwrap_or("").to_string())
        }
    }

    fn full_registry() -> ToolRegistry {
        let config = Config::default();
        let market = Arc::new(MarketData::new(config.fetch.clone()));
        ToolRegistry::from_config(&config, market)
    }

    #[test]
    fn default_config_registers_full_catalog() {
        let registry = full_registry();
        assert_eq!(registry.len(), 21);
        let names = registry.names();
        for expected in [
            "search_stock",
            "search_stock_any",
            "get_stock_realtime",
            "get_stock_history",
            "get_stock_info",
            "get_stock_financials",
            "get_hot_stocks",
            "get_industry_boards",
            "get_industry_board_detail",
            "get_concept_boards",
            "get_concept_stocks",
            "search_stock_hk",
            "get_stock_hk_realtime",
            "get_etf_realtime",
            "get_etf_history",
            "get_futures_realtime",
            "get_index_realtime",
            "get_index_history",
            "get_macro_cpi",
            "get_macro_gdp",
            "get_money_supply",
        ] {
            assert!(names.contains(&expected), "缺少工具 {}", expected);
        }
    }

    #[test]
    fn category_flags_gate_registration() {
        let mut config = Config::default();
        config.tools.enable_macro_tools = false;
        config.tools.enable_futures_tools = false;
        let market = Arc::new(MarketData::new(config.fetch.clone()));
        let registry = ToolRegistry::from_config(&config, market);
        assert_eq!(registry.len(), 17);
        assert!(registry.get("get_macro_cpi").is_none());
        assert!(registry.get("get_futures_realtime").is_none());
        assert!(registry.get("search_stock").is_some());

        let mut config = Config::default();
        config.tools.enable_stock_tools = false;
        let market = Arc::new(MarketData::new(config.fetch.clone()));
        let registry = ToolRegistry::from_config(&config, market);
        assert_eq!(registry.len(), 10);
        assert!(registry.get("get_industry_boards").is_none());
    }

    #[test]
    fn board_and_index_tools_not_thread_safe() {
        let registry = full_registry();
        let unsafe_names: Vec<&str> = registry
            .specs()
            .iter()
            .filter(|s| !s.thread_safe)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            unsafe_names,
            vec![
                "get_industry_boards",
                "get_industry_board_detail",
                "get_concept_boards",
                "get_concept_stocks",
                "get_index_realtime",
                "get_index_history",
            ]
        );
    }

    #[test]
    fn schemas_are_function_call_format() {
        let registry = full_registry();
        let schemas = registry.openai_schemas();
        assert_eq!(schemas.len(), 21);
        for schema in &schemas {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].is_string());
            assert!(schema["function"]["parameters"].is_object());
        }
    }

    #[test]
    fn describe_groups_by_category() {
        let registry = full_registry();
        let text = registry.describe();
        assert!(text.contains("股票数据 (A股):"));
        assert!(text.contains("宏观数据:"));
        assert!(text.contains("- get_macro_gdp:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("未找到工具: nope"));
    }

    #[tokio::test]
    async fn execute_runs_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let out = registry.execute("echo", json!({"msg": "你好"})).await.unwrap();
        assert_eq!(out, "你好");
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
