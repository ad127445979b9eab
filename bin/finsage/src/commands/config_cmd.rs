use finsage_core::{Config, Paths};

/// 展示当前生效的配置（文件 + 环境变量合并后的结果）。
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();

    if !config.custom_api_key.is_empty() {
        config.custom_api_key = mask_key(&config.custom_api_key);
    }

    println!();
    println!("📋 当前生效的配置");
    println!("  配置文件: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// 保留首尾各 4 位，中间打码。
fn mask_key(key: &str) -> String {
    if key.len() > 8 {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "(set)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key_keeps_ends() {
        assert_eq!(mask_key("sk-abcdefgh12345678"), "sk-a...5678");
        assert_eq!(mask_key("short"), "(set)");
    }
}
