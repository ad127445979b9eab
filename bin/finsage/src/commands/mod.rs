pub mod chat;
pub mod completions_cmd;
pub mod config_cmd;
pub mod providers_cmd;
pub mod query;
pub mod tools_cmd;

use finsage_core::{Config, Paths};
use finsage_providers::catalog;
use tracing::debug;

/// 读取配置文件并套用环境变量，再用命令行参数覆盖提供商与模型。
pub(crate) fn load_config(
    provider: Option<String>,
    model: Option<String>,
) -> anyhow::Result<Config> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();

    if let Some(p) = provider {
        config.provider = p;
    }
    if let Some(m) = model {
        config.model = m;
    }

    if catalog::find(&config.provider).is_none() {
        anyhow::bail!(
            "不支持的提供商 '{}'，运行 `finsage providers` 查看可用列表",
            config.provider
        );
    }

    debug!(provider = %config.provider, "配置加载完成");
    Ok(config)
}
