use std::io::{BufRead, Write};
use std::time::Instant;

use finsage_agent::ResearchAgent;
use finsage_core::ChatMessage;
use finsage_providers::resolve_model;
use tokio::sync::mpsc;

use crate::render::EventRenderer;

/// 多轮对话模式：对话内容作为上下文参与后续推理。
pub async fn run(provider: Option<String>, model: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config(provider, model)?;
    let model_name = resolve_model(&config);
    let provider_name = config.provider.clone();

    let agent = ResearchAgent::new(config)?;

    println!();
    println!("💹 finsage 金融研究助手");
    println!("   模型: {} / {}", provider_name, model_name);
    println!("   已注册 {} 个数据工具", agent.registry().len());
    println!("   输入问题开始分析，输入 /quit 退出");

    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = std::io::stdin();

    loop {
        println!();
        print!("你: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            println!("👋 再见！");
            break;
        }

        let question = line.trim().to_string();
        if question.is_empty() {
            continue;
        }
        if matches!(
            question.to_lowercase().as_str(),
            "/quit" | "/exit" | "q" | "quit" | "exit"
        ) {
            println!("👋 再见！");
            break;
        }

        println!();
        let start = Instant::now();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            let mut renderer = EventRenderer::new(true);
            while let Some(event) = rx.recv().await {
                renderer.render(&event);
            }
        });

        let result = agent.run(&question, Some(&mut history), &tx).await;
        drop(tx);
        let _ = printer.await;

        // 模型侧失败不终止对话，提示后等待下一个问题
        match result {
            Ok(_) => {
                println!();
                println!("⏱ 本轮用时 {:.1} 秒", start.elapsed().as_secs_f32());
            }
            Err(e) => {
                println!();
                println!("❌ 本轮执行失败: {}", e);
            }
        }
    }

    Ok(())
}
