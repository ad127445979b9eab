use finsage_core::{Config, Paths};
use finsage_providers::{resolve_model, PROVIDERS};

/// 列出支持的模型提供商及其配置状态。
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();

    println!();
    println!("📡 支持的模型提供商");
    println!();

    for spec in PROVIDERS {
        let icon = if spec.name == config.provider {
            "⭐"
        } else if spec.is_configured() {
            "✓ "
        } else {
            "✗ "
        };
        let model = if spec.default_model.is_empty() {
            "(需指定)"
        } else {
            spec.default_model
        };
        println!("  {} {:<12} {:<20} {}", icon, spec.name, spec.env_key, model);
        println!("       {}", spec.description);
    }

    println!();
    println!("  当前默认: {} / {}", config.provider, resolve_model(&config));
    println!("  提示: 设置 FINSAGE_PROVIDER / FINSAGE_MODEL 环境变量可修改默认值");
    println!();
    Ok(())
}
