use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

mod app;
mod chat;
mod config;
mod format;
mod handler;
mod stream;
mod tui;
mod ui;

use app::App;
use chat::{ChatClient, ChatMessage};
use config::Config;

#[derive(Parser)]
#[command(name = "minichat")]
#[command(about = "Terminal chat client for streaming LLM chat endpoints")]
struct Cli {
    /// Chat endpoint base URL (overrides the config file)
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// Ask a single question and stream the reply to stdout
    Ask {
        /// Your question
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|_| Config::new());
    if let Some(url) = cli.url {
        config.api_url = Some(url);
    }

    match cli.command {
        None | Some(Commands::Chat) => run_tui(config).await?,
        Some(Commands::Ask { question }) => ask(&config, &question).await?,
    }

    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run_loop(&mut terminal, config).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut tui::Tui, config: Config) -> Result<()> {
    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, events.sender());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event)?,
            None => break,
        }
    }

    Ok(())
}

async fn ask(config: &Config, question: &str) -> Result<()> {
    use std::io::Write;

    let client = ChatClient::new(config.api_url());
    let messages = vec![
        ChatMessage::assistant(config.greeting()),
        ChatMessage::user(question),
    ];

    println!("{}", "Assistant:".bold().green());

    let result = client
        .stream_chat(&messages, |fragment| {
            print!("{}", fragment);
            let _ = std::io::stdout().flush();
        })
        .await;

    match result {
        Ok(reply) => {
            if reply.is_empty() {
                println!("{}", "(empty reply)".dimmed());
            } else {
                println!();
            }
        }
        Err(e) => {
            println!("{}: {}", "Error talking to the chat endpoint".red(), e);
            println!(
                "Make sure the server is reachable at {}",
                config.api_url().bold()
            );
        }
    }

    Ok(())
}
