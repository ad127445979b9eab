use finsage_agent::ResearchAgent;
use finsage_providers::{catalog, resolve_model};
use tokio::sync::mpsc;

use crate::render::EventRenderer;

/// 单次问答：执行完一个问题后退出。
pub async fn run(
    question: &str,
    provider: Option<String>,
    model: Option<String>,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(provider, model)?;

    println!();
    println!("❓ {}", question);
    println!("🤖 模型: {} / {}", config.provider, resolve_model(&config));
    println!();

    if let Some(spec) = catalog::find(&config.provider) {
        if !spec.is_configured() && config.custom_api_key.is_empty() {
            println!("⚠ 未设置 {} 环境变量，调用模型时将会失败", spec.env_key);
        }
    }

    let agent = ResearchAgent::new(config)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut renderer = EventRenderer::new(verbose);
        while let Some(event) = rx.recv().await {
            renderer.render(&event);
        }
    });

    let result = agent.run(question, None, &tx).await;
    drop(tx);
    printer.await?;
    result?;

    Ok(())
}
