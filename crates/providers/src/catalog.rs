//! 模型提供商目录。
//!
//! 国产模型走各家的 OpenAI 兼容接口，海外模型与本地部署分别由
//! 专门的 provider 实现。API Key 一律从环境变量读取，不落盘。

#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub name: &'static str,
    /// API Key 环境变量名（ollama 例外：存放 base URL）
    pub env_key: &'static str,
    pub base_url: Option<&'static str>,
    pub default_model: &'static str,
    pub description: &'static str,
}

pub const PROVIDERS: &[ProviderSpec] = &[
    // 国产模型
    ProviderSpec {
        name: "deepseek",
        env_key: "DEEPSEEK_API_KEY",
        base_url: Some("https://api.deepseek.com/v1"),
        default_model: "deepseek-chat",
        description: "DeepSeek，推理能力强、性价比高",
    },
    ProviderSpec {
        name: "doubao",
        env_key: "DOUBAO_API_KEY",
        base_url: Some("https://ark.cn-beijing.volces.com/api/v3"),
        default_model: "doubao-1-5-pro-256k",
        description: "豆包(火山引擎)，Seed 深度思考系列，256k 上下文",
    },
    ProviderSpec {
        name: "dashscope",
        env_key: "DASHSCOPE_API_KEY",
        base_url: Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        default_model: "qwen-max",
        description: "DashScope(阿里云灵积)，通义千问商业版",
    },
    ProviderSpec {
        name: "zhipu",
        env_key: "ZHIPU_API_KEY",
        base_url: Some("https://open.bigmodel.cn/api/paas/v4"),
        default_model: "glm-4.7",
        description: "智谱 AI，GLM-Z1/GLM-4 系列",
    },
    ProviderSpec {
        name: "modelscope",
        env_key: "MODELSCOPE_API_KEY",
        base_url: Some("https://api-inference.modelscope.cn/v1"),
        default_model: "qwen2.5-72b-instruct",
        description: "ModelScope(魔搭社区)，Qwen 开源版",
    },
    ProviderSpec {
        name: "kimi",
        env_key: "KIMI_API_KEY",
        base_url: Some("https://api.moonshot.cn/v1"),
        default_model: "moonshot-v1-128k",
        description: "Kimi/Moonshot，长上下文支持",
    },
    ProviderSpec {
        name: "stepfun",
        env_key: "STEPFUN_API_KEY",
        base_url: Some("https://api.stepfun.com/v1"),
        default_model: "step-2-16k",
        description: "阶跃星辰，Step-2/Step-1 系列",
    },
    ProviderSpec {
        name: "minimax",
        env_key: "MINIMAX_API_KEY",
        base_url: Some("https://api.minimax.chat/v1"),
        default_model: "MiniMax-Text-01",
        description: "MiniMax，M2.1 系列",
    },
    // 海外模型
    ProviderSpec {
        name: "openai",
        env_key: "OPENAI_API_KEY",
        base_url: None,
        default_model: "gpt-4o",
        description: "OpenAI，GPT-4o、GPT-4、GPT-3.5",
    },
    ProviderSpec {
        name: "anthropic",
        env_key: "ANTHROPIC_API_KEY",
        base_url: None,
        default_model: "claude-sonnet-4-20250514",
        description: "Anthropic，Claude 系列",
    },
    ProviderSpec {
        name: "openrouter",
        env_key: "OPENROUTER_API_KEY",
        base_url: Some("https://openrouter.ai/api/v1"),
        default_model: "anthropic/claude-sonnet-4",
        description: "OpenRouter，聚合多家模型",
    },
    ProviderSpec {
        name: "together",
        env_key: "TOGETHER_API_KEY",
        base_url: Some("https://api.together.xyz/v1"),
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        description: "Together AI，开源模型托管",
    },
    ProviderSpec {
        name: "groq",
        env_key: "GROQ_API_KEY",
        base_url: Some("https://api.groq.com/openai/v1"),
        default_model: "llama-3.3-70b-versatile",
        description: "Groq，超快推理速度",
    },
    // 本地部署
    ProviderSpec {
        name: "ollama",
        env_key: "OLLAMA_BASE_URL",
        base_url: Some("http://localhost:11434"),
        default_model: "qwen2.5:14b",
        description: "Ollama，本地运行开源模型",
    },
    // 自定义
    ProviderSpec {
        name: "custom",
        env_key: "CUSTOM_API_KEY",
        base_url: None,
        default_model: "",
        description: "自定义 OpenAI 兼容接口",
    },
];

pub fn find(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.name == name)
}

impl ProviderSpec {
    pub fn resolve_api_key(&self) -> String {
        std::env::var(self.env_key).unwrap_or_default()
    }

    /// ollama 只需要可达的 base URL，不需要 key
    pub fn is_configured(&self) -> bool {
        if self.name == "ollama" {
            return true;
        }
        !self.resolve_api_key().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        let mut names: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PROVIDERS.len());
    }

    #[test]
    fn test_find_known_provider() {
        let spec = find("deepseek").unwrap();
        assert_eq!(spec.env_key, "DEEPSEEK_API_KEY");
        assert_eq!(spec.base_url, Some("https://api.deepseek.com/v1"));
        assert_eq!(spec.default_model, "deepseek-chat");
    }

    #[test]
    fn test_find_unknown_provider() {
        assert!(find("does-not-exist").is_none());
    }

    #[test]
    fn test_custom_has_no_fixed_base() {
        let spec = find("custom").unwrap();
        assert!(spec.base_url.is_none());
        assert!(spec.default_model.is_empty());
    }
}
