use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;

use blob_chat::config::{self, AppConfig};
use blob_chat::storage;
use blob_chat::sync::{ChatSession, CleanupSweeper, SessionTimers, SyncEngine};
use blob_chat::ui::app::render_rows;
use blob_chat::ui::{AppState, ChatApp};

#[derive(Parser)]
#[command(
    name = "blob_chat",
    version,
    about = "Multi-writer chat log kept in a single shared JSON document"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Writer name (overrides config and CHAT_USERNAME)
    #[arg(long, short)]
    user: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Mode {
    /// Interactive session (default)
    Chat,
    /// Send one message and exit
    Send {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Fetch once and print the current window
    Show,
    /// Run one cleanup sweep
    Sweep,
    /// Write a config file with default values
    InitConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    if cli.mode == Some(Mode::InitConfig) {
        return match config::save_config(&cli.config, &AppConfig::default()) {
            Ok(()) => {
                log::info!("Wrote default config to {}", cli.config);
                ExitCode::SUCCESS
            }
            Err(err) => {
                log::error!("Failed to write config {}: {err}", cli.config);
                ExitCode::FAILURE
            }
        };
    }

    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env_overrides();

    match run(cli, app_config).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, app_config: AppConfig) -> Result<ExitCode, Box<dyn Error>> {
    let username = cli
        .user
        .or_else(|| app_config.username.clone())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let store = storage::build_store(&app_config)?;
    let writer = username.clone().unwrap_or_default();
    let engine = Arc::new(SyncEngine::from_app(store, &app_config, &writer));

    match cli.mode.unwrap_or(Mode::Chat) {
        Mode::Chat => {
            require_username(&username)?;
            run_chat(engine, &app_config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Send { text } => {
            require_username(&username)?;
            match engine.send_message(&text.join(" ")).await? {
                Some(receipt) => {
                    println!("{}", receipt.message.id);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    log::warn!("Nothing to send");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Mode::Show => {
            let mut state = AppState::new(app_config.max_visible_lines);
            state.set_lines(engine.fetch().await?);
            print!(
                "{}",
                render_rows(&state.rows(), engine.username(), engine.my_color())
            );
            Ok(ExitCode::SUCCESS)
        }
        Mode::Sweep => {
            let outcome = CleanupSweeper::new(app_config.max_visible_lines)
                .sweep(&engine)
                .await?;
            println!("removed {} messages", outcome.removed());
            Ok(ExitCode::SUCCESS)
        }
        Mode::InitConfig => Ok(ExitCode::SUCCESS),
    }
}

fn require_username(username: &Option<String>) -> Result<(), Box<dyn Error>> {
    if username.is_none() {
        return Err("no username given; pass --user or set CHAT_USERNAME".into());
    }
    Ok(())
}

async fn run_chat(engine: Arc<SyncEngine>, app_config: &AppConfig) -> Result<(), Box<dyn Error>> {
    // UI -> session
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // session -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let session = ChatSession::new(
        Arc::clone(&engine),
        SessionTimers::from_app(app_config),
        event_tx,
        cmd_rx,
    );
    let session_handle = tokio::spawn(session.run());

    let app = ChatApp::new(
        engine.username(),
        engine.my_color(),
        app_config.max_visible_lines,
        cmd_tx,
        event_rx,
    );
    app.run().await?;

    if let Err(err) = session_handle.await {
        log::error!("Sync session terminated: {err}");
    }
    Ok(())
}
