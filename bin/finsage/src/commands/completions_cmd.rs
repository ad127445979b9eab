use clap_complete::{generate, Shell};

/// 生成 shell 补全脚本。CLI 定义由 main 传入，避免在这里重复声明。
pub async fn run(shell: &str, mut cmd: clap::Command) -> anyhow::Result<()> {
    let shell = match shell.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "powershell" | "ps" => Shell::PowerShell,
        "elvish" => Shell::Elvish,
        _ => {
            anyhow::bail!(
                "不支持的 shell: {}，可选 bash、zsh、fish、powershell、elvish",
                shell
            );
        }
    };

    generate(shell, &mut cmd, "finsage", &mut std::io::stdout());

    eprintln!();
    eprintln!("# 用法:");
    match shell {
        Shell::Bash => {
            eprintln!("#   finsage completions bash > ~/.local/share/bash-completion/completions/finsage");
            eprintln!("#   或: eval \"$(finsage completions bash)\"");
        }
        Shell::Zsh => {
            eprintln!("#   finsage completions zsh > ~/.zfunc/_finsage");
            eprintln!("#   确保 fpath 包含 ~/.zfunc 并执行 compinit");
        }
        Shell::Fish => {
            eprintln!("#   finsage completions fish > ~/.config/fish/completions/finsage.fish");
        }
        _ => {}
    }

    Ok(())
}
