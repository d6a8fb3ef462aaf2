//! Quizcast — scheduled quiz polls for Telegram groups.

mod router;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quizcast_core::config::QuizcastConfig;
use quizcast_core::traits::Store;
use quizcast_engine::{QuizService, Scheduler};
use quizcast_store::FallbackStore;
use quizcast_telegram::TelegramTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quizcast", version, about = "Scheduled quiz polls for Telegram groups")]
struct Cli {
    /// Path to config.toml (defaults to ~/.quizcast/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the Telegram command router (default).
    Run,
    /// Add a quiz to the bank.
    AddQuiz {
        #[arg(long)]
        question: String,
        /// Answer options; repeat the flag per option (2-10).
        #[arg(long = "option", required = true)]
        options: Vec<String>,
        /// Zero-based index of the correct option.
        #[arg(long)]
        correct: u32,
        #[arg(long)]
        category: Option<String>,
    },
    /// List registered groups.
    ListGroups,
    /// Show engagement statistics.
    Stats {
        #[arg(long)]
        chat_id: Option<i64>,
    },
    /// Send a quiz to one group immediately.
    Send {
        #[arg(long)]
        chat_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => QuizcastConfig::load_from(path)?,
        None => QuizcastConfig::load()?,
    };

    let store: Arc<dyn Store> = if config.storage.memory_only {
        Arc::new(FallbackStore::memory_only())
    } else {
        Arc::new(FallbackStore::open(&config.storage.db_path()))
    };
    let transport = Arc::new(TelegramTransport::new(
        config.telegram.clone(),
        config.delivery.send_timeout_secs,
    ));
    let service = QuizService::new(store, transport.clone(), &config);
    service.recover().await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(service, transport, &config).await,
        Command::AddQuiz {
            question,
            options,
            correct,
            category,
        } => {
            let quiz = service
                .add_quiz(&question, options, correct, category)
                .await?;
            println!("added quiz {}", quiz.id);
            Ok(())
        }
        Command::ListGroups => {
            for group in service.list_groups().await? {
                println!(
                    "{}\t{}\t{}",
                    group.chat_id,
                    if group.active { "active" } else { "inactive" },
                    group.title.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        Command::Stats { chat_id } => {
            let report = service.stats(chat_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Send { chat_id } => {
            service.register_group(chat_id, None).await?;
            let quiz_id = service.trigger_manual_send(chat_id).await?;
            println!("sent quiz {quiz_id} to chat {chat_id}");
            Ok(())
        }
    }
}

async fn run(
    service: Arc<QuizService>,
    transport: Arc<TelegramTransport>,
    config: &QuizcastConfig,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        !config.telegram.bot_token.is_empty(),
        "telegram.bot_token is not configured"
    );
    let me = transport
        .get_me()
        .await
        .context("could not reach the Telegram API")?;
    tracing::info!(
        "🤖 running as @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(
        Scheduler::new(service.clone(), config.schedule.tick_secs).run(shutdown_rx.clone()),
    );
    let router = tokio::spawn(router::run(service, transport, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.await?;
    // The router may be parked in a long poll; give it a moment, then drop it.
    if tokio::time::timeout(Duration::from_secs(2), router).await.is_err() {
        tracing::debug!("router still polling, abandoning it");
    }
    Ok(())
}
