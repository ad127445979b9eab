use std::sync::Arc;

use finsage_core::{Config, Paths};
use finsage_tools::{MarketData, ToolRegistry};

/// 列出所有注册的金融数据工具，不要求配置模型。
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();

    let market = Arc::new(MarketData::new(config.fetch.clone()));
    let registry = ToolRegistry::from_config(&config, market);

    println!();
    println!("🔧 可用工具（共 {} 个）", registry.len());
    println!("{}", registry.describe());
    println!();
    Ok(())
}
