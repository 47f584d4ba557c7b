use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rsvp_sync_lib::application::services::ReconcileOutcome;
use rsvp_sync_lib::domain::value_objects::{EventId, ResponseValue, UserId};
use rsvp_sync_lib::infrastructure::http::ApiClient;
use rsvp_sync_lib::infrastructure::storage::FileKeyValueStore;
use rsvp_sync_lib::state::{DURABLE_STORE_FILE, SESSION_STORE_FILE};
use rsvp_sync_lib::{AppConfig, AppState};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rsvp-sync")]
#[command(about = "Event response sync client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[arg(short, long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for the local stores
    #[arg(long, global = true, env = "RSVP_DATA_DIR")]
    data_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a response to an event ("none" clears it)
    Respond {
        event: String,
        value: String,
        /// Mark the event as reached through a shared link
        #[arg(long)]
        via_link: bool,
        /// Mark the event as reached through an invitation from this user
        #[arg(long)]
        invited_by: Option<String>,
    },
    /// Show the current response per event
    History,
    /// List events
    Events {
        /// Only events of the current user
        #[arg(long)]
        mine: bool,
    },
    /// Switch to an authenticated identity, migrating anonymous responses
    Login { user: String },
    /// Forget the current identity
    Logout,
    /// Show identity and queue state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rsvp_sync_lib::init_logging_with(cli.log_level.as_deref());

    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config.storage.data_dir = dir;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let state = build_state(config).await?;
    info!("rsvp-sync v{} as {}", env!("CARGO_PKG_VERSION"), state.identity().await);

    let outcome = tokio::select! {
        result = run(&state, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, flushing pending mutations");
            Ok(())
        }
    };

    for report in state.shutdown().await {
        if let Err(e) = &report.result {
            warn!("batch for {} did not fully settle: {}", report.user_id, e);
        }
    }
    outcome
}

async fn build_state(config: AppConfig) -> Result<AppState> {
    let api = Arc::new(ApiClient::new(&config.api)?);
    let data_dir = Path::new(&config.storage.data_dir);
    // CLI は毎回プロセスが終わるので、訪問者 ID もファイルに残す
    let durable = FileKeyValueStore::open(data_dir.join(DURABLE_STORE_FILE)).await?;
    let session = FileKeyValueStore::open(data_dir.join(SESSION_STORE_FILE)).await?;

    let state = AppState::from_parts(
        config,
        api.clone(),
        api,
        Arc::new(durable),
        Arc::new(session),
    )
    .await?;
    Ok(state)
}

async fn run(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Respond {
            event,
            value,
            via_link,
            invited_by,
        } => {
            let event_id = EventId::new(event).map_err(anyhow::Error::msg)?;
            let value = parse_value(&value)?;
            let provenance = state.responses.provenance();
            if let Some(inviter) = invited_by {
                let inviter = UserId::new(inviter).map_err(anyhow::Error::msg)?;
                provenance.record_invitation(event_id.clone(), inviter).await;
            } else if via_link {
                provenance.record_link_arrival(event_id.clone()).await;
            }

            let record = state.responses.respond(event_id, value).await?;
            print_json(&record)?;
        }
        Commands::History => {
            let latest = state.responses.my_responses().await?;
            print_json(&latest)?;
        }
        Commands::Events { mine } => {
            let events = if mine {
                let user_id = state.identity().await.user_id().clone();
                state.catalog.my_events(&user_id).await?
            } else {
                state.catalog.events().await?
            };
            print_json(&events)?;
        }
        Commands::Login { user } => {
            let user_id = UserId::new(user).map_err(anyhow::Error::msg)?;
            match state.login(user_id.clone()).await? {
                ReconcileOutcome::Migrated { responses_migrated } => {
                    println!("logged in as {user_id}, migrated {responses_migrated} responses")
                }
                ReconcileOutcome::AlreadyReconciled | ReconcileOutcome::NothingToMigrate => {
                    println!("logged in as {user_id}")
                }
                ReconcileOutcome::Failed(e) => {
                    println!("logged in as {user_id}, but response migration failed: {e}")
                }
            }
        }
        Commands::Logout => {
            let identity = state.logout().await?;
            println!("now browsing as {identity}");
        }
        Commands::Status => {
            let status = serde_json::json!({
                "identity": state.identity().await,
                "privacy": state.session.privacy().await?,
                "queue": state.queue.status(),
                "config": state.config.as_ref(),
            });
            print_json(&status)?;
        }
    }
    Ok(())
}

fn parse_value(raw: &str) -> Result<Option<ResponseValue>> {
    match raw {
        "none" | "null" => Ok(None),
        other => other
            .parse::<ResponseValue>()
            .map(Some)
            .map_err(anyhow::Error::msg),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
