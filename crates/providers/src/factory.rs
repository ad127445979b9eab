use std::sync::Arc;

use finsage_core::{Config, Error, Result};

use crate::{catalog, AnthropicProvider, OllamaProvider, OpenAIProvider, Provider};

/// 解析最终生效的模型名：config.model 为空时取目录默认
pub fn resolve_model(config: &Config) -> String {
    if !config.model.is_empty() {
        return config.model.clone();
    }
    catalog::find(&config.provider)
        .map(|spec| spec.default_model.to_string())
        .unwrap_or_default()
}

/// 统一的 provider 创建入口。
///
/// - `custom`: 走 OpenAI 兼容接口，base URL 和 key 来自 config
///   （CUSTOM_BASE_URL / CUSTOM_API_KEY 已在 apply_env 时合并进来）
/// - `ollama`: 无需 API Key，OLLAMA_BASE_URL 可覆盖默认地址
/// - `anthropic`: 原生 Messages API
/// - 其余全部走 OpenAI 兼容接口
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let name = config.provider.as_str();

    if name == "custom" {
        let base_url = if !config.custom_base_url.is_empty() {
            config.custom_base_url.clone()
        } else {
            std::env::var("CUSTOM_BASE_URL").unwrap_or_default()
        };
        if base_url.is_empty() {
            return Err(Error::Config(
                "Provider 'custom' requires a base URL; set CUSTOM_BASE_URL".to_string(),
            ));
        }
        if config.model.is_empty() {
            return Err(Error::Config(
                "Provider 'custom' requires an explicit model".to_string(),
            ));
        }
        let api_key = if !config.custom_api_key.is_empty() {
            config.custom_api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };
        return Ok(Arc::new(OpenAIProvider::new(
            &api_key,
            Some(&base_url),
            &config.model,
            config.max_tokens,
            config.temperature,
        )));
    }

    let spec = catalog::find(name)
        .ok_or_else(|| Error::Config(format!("Unknown provider '{}'", name)))?;
    let model = if config.model.is_empty() {
        spec.default_model.to_string()
    } else {
        config.model.clone()
    };

    match name {
        "anthropic" => {
            let api_key = spec.resolve_api_key();
            if api_key.is_empty() {
                return Err(Error::Config(format!(
                    "Provider '{}' has no API key; set {}",
                    name, spec.env_key
                )));
            }
            Ok(Arc::new(AnthropicProvider::new(
                &api_key,
                None,
                &model,
                config.max_tokens,
                config.temperature,
            )))
        }
        "ollama" => {
            let env_base = std::env::var("OLLAMA_BASE_URL").ok();
            let base = env_base.as_deref().or(spec.base_url);
            Ok(Arc::new(OllamaProvider::new(
                base,
                &model,
                config.max_tokens,
                config.temperature,
            )))
        }
        _ => {
            let api_key = spec.resolve_api_key();
            if api_key.is_empty() {
                return Err(Error::Config(format!(
                    "Provider '{}' has no API key; set {}",
                    name, spec.env_key
                )));
            }
            Ok(Arc::new(OpenAIProvider::new(
                &api_key,
                spec.base_url,
                &model,
                config.max_tokens,
                config.temperature,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_fails() {
        let mut config = Config::default();
        config.provider = "no-such-vendor".to_string();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_custom_without_base_url_fails() {
        let mut config = Config::default();
        config.provider = "custom".to_string();
        config.model = "my-model".to_string();
        config.custom_base_url = String::new();
        std::env::remove_var("CUSTOM_BASE_URL");
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_custom_with_base_url() {
        let mut config = Config::default();
        config.provider = "custom".to_string();
        config.model = "my-model".to_string();
        config.custom_base_url = "https://models-proxy.example.com/v1".to_string();
        assert!(create_provider(&config).is_ok());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = Config::default();
        config.provider = "ollama".to_string();
        assert!(create_provider(&config).is_ok());
    }

    #[test]
    fn test_resolve_model_falls_back_to_catalog_default() {
        let mut config = Config::default();
        config.provider = "deepseek".to_string();
        config.model = String::new();
        assert_eq!(resolve_model(&config), "deepseek-chat");
        config.model = "deepseek-reasoner".to_string();
        assert_eq!(resolve_model(&config), "deepseek-reasoner");
    }
}
