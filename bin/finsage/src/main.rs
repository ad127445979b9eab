mod commands;
mod render;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "finsage")]
#[command(about = "基于多数据源的金融研究 Agent 命令行工具", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 单次问答：回答一个问题后退出
    Query {
        /// 要研究的金融问题
        question: String,

        /// 模型提供商（默认读取 FINSAGE_PROVIDER）
        #[arg(short, long)]
        provider: Option<String>,

        /// 模型名称（默认读取 FINSAGE_MODEL）
        #[arg(short, long)]
        model: Option<String>,

        /// 不展示工具调用过程
        #[arg(short, long)]
        quiet: bool,
    },

    /// 进入多轮对话模式
    Chat {
        /// 模型提供商（默认读取 FINSAGE_PROVIDER）
        #[arg(short, long)]
        provider: Option<String>,

        /// 模型名称（默认读取 FINSAGE_MODEL）
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 列出所有可用的金融数据工具
    Tools,

    /// 列出支持的模型提供商及配置情况
    Providers,

    /// 查看当前生效的配置
    Config,

    /// 生成 shell 补全脚本
    Completions {
        /// Shell 类型 (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Query {
            question,
            provider,
            model,
            quiet,
        } => {
            commands::query::run(&question, provider, model, !quiet).await?;
        }
        Commands::Chat { provider, model } => {
            commands::chat::run(provider, model).await?;
        }
        Commands::Tools => {
            commands::tools_cmd::run().await?;
        }
        Commands::Providers => {
            commands::providers_cmd::run().await?;
        }
        Commands::Config => {
            commands::config_cmd::run().await?;
        }
        Commands::Completions { shell } => {
            commands::completions_cmd::run(&shell, Cli::command()).await?;
        }
    }

    Ok(())
}
