mod agent;
mod auth;
mod config;
mod error;
mod format;
mod session;
mod telemetry;
mod tui;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use agent::{AgentSession, CopilotClient};
use auth::{EntraTokenProvider, TokenSource};
use config::{AgentConfig, ConfigFile};
use session::{ChatSession, Role, SessionFactory};

#[derive(Parser, Debug)]
#[command(
    name = "copichat",
    about = "A terminal chat client for Microsoft Copilot Studio agents",
    long_about = None,
)]
struct Args {
    /// Ask a single question and exit (omit to enter the interactive TUI)
    question: Option<String>,

    /// Power Platform environment ID
    #[arg(long, env = "COPICHAT_ENVIRONMENT_ID")]
    environment_id: Option<String>,

    /// Agent schema name (not the display name)
    #[arg(long, env = "COPICHAT_AGENT_ID")]
    agent_id: Option<String>,

    /// Entra ID tenant ID
    #[arg(long, env = "COPICHAT_TENANT_ID")]
    tenant_id: Option<String>,

    /// Client ID of the app registration used for sign-in
    #[arg(long, env = "COPICHAT_CLIENT_ID")]
    client_id: Option<String>,

    /// Show timestamps on messages
    #[arg(long)]
    timestamps: bool,

    /// Write a default config file to ~/.config/copichat/config.toml and exit
    #[arg(long)]
    init: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Fill in the [agent] values, then run: copichat");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;
    let resolved = config::resolve(
        &file,
        args.environment_id.as_deref(),
        args.agent_id.as_deref(),
        args.tenant_id.as_deref(),
        args.client_id.as_deref(),
    );

    // ── One-shot mode (plain stdout, no TUI) ──────────────────────────────────
    if let Some(question) = args.question {
        return run_once(question, resolved).await;
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    tui::run(resolved, args.timestamps).await
}

// ── One-shot mode ─────────────────────────────────────────────────────────────

async fn run_once(question: String, resolved: AgentConfig) -> Result<()> {
    println!();
    println!("  ▲ copichat");
    println!();

    if !resolved.is_complete() {
        eprintln!("  ✗ missing configuration: {}", resolved.missing_fields().join(", "));
        eprintln!("    Set COPICHAT_* environment variables or run `copichat --init`.");
        std::process::exit(1);
    }

    let tokens: Arc<dyn TokenSource> = Arc::new(EntraTokenProvider::new(|prompt| {
        println!("  {}", prompt.message);
        println!();
    }));
    let factory: SessionFactory =
        Box::new(|config| Arc::new(CopilotClient::new(config.clone())) as Arc<dyn AgentSession>);
    let mut session = ChatSession::new(resolved, tokens, factory);
    println!(
        "  environment {}",
        ui::mask_value(&session.config().environment_id, false)
    );
    println!();

    if let Err(e) = session.connect().await {
        eprintln!("  ✗ {e}");
        if let Some(hint) = e.hint() {
            eprintln!("    {hint}");
        }
        std::process::exit(1);
    }
    for message in session.messages() {
        print_message(message);
    }

    if let Err(e) = session.send(&question).await {
        eprintln!("  ✗ {e}");
        std::process::exit(1);
    }
    // The greeting was already printed; show the question and the reply.
    for message in session.messages().iter().skip_while(|m| m.role == Role::Assistant) {
        print_message(message);
    }

    Ok(())
}

fn print_message(message: &session::Message) {
    let label = ui::role_label(message.role);
    let mut first = true;
    let mut emit = |line: String| {
        if first {
            first = false;
            println!("  {label:<6} {line}");
        } else {
            println!("         {line}");
        }
    };
    match message.role {
        Role::User => {
            for line in message.content.lines() {
                emit(line.to_string());
            }
        }
        Role::Assistant => {
            for block in format::parse(&message.content) {
                emit(match block {
                    format::Block::Spacer => String::new(),
                    format::Block::Rule => "─".repeat(24),
                    format::Block::Heading(inlines) => format::plain_text(&inlines),
                    format::Block::ListItem(inlines) => {
                        format!("• {}", format::plain_text(&inlines))
                    }
                    format::Block::Paragraph(inlines) => format::plain_text(&inlines),
                });
            }
        }
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "elvish" => Shell::Elvish,
        _ => {
            eprintln!("Unknown shell: {shell_name}");
            eprintln!("Supported: bash, zsh, fish, elvish");
            std::process::exit(1);
        }
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "copichat", &mut std::io::stdout());
    Ok(())
}
