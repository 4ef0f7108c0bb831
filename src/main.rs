use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::TaskClient;
use crate::config::Configuration;
use crate::database::TaskStore;
use crate::editor::{TaskDraft, open_editor};
use crate::list_ui::Filter;
use crate::repository::TaskRepository;
use crate::task::{NewTask, Priority};

mod api;
mod client;
mod config;
mod database;
mod editor;
mod list_ui;
mod repository;
mod task;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cmd {
    /// Read settings from this file instead of ~/.config/taskboard/taskboard.toml.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Browse tasks interactively.
    List {
        #[arg(short, long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Create a task. Opens the editor when no title is given.
    Add {
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, value_name = "low|medium|high")]
        priority: Option<Priority>,
    },
    /// Edit a task in the editor.
    Edit { id: i64 },
    /// Mark a task as done.
    Done {
        id: i64,
        /// Mark it as open again instead.
        #[arg(long)]
        undo: bool,
    },
    /// Delete a task.
    Remove { id: i64 },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Open,
    Done,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(cfg: &Configuration) -> color_eyre::Result<()> {
    let store = TaskStore::connect(&cfg.database)
        .await
        .wrap_err_with(|| format!("can't open database {}", cfg.database.url))?;
    let state = api::AppState::new(TaskRepository::new(store));

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(api::cors(&cfg.server).wrap_err("invalid allowed_origins")?);

    let address = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("can't bind {address}"))?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

async fn add(
    client: &TaskClient,
    editor: &str,
    title: Option<String>,
    description: String,
    priority: Option<Priority>,
) -> color_eyre::Result<()> {
    let input = match title {
        Some(title) => NewTask {
            title,
            description,
            priority: priority.unwrap_or_default(),
        },
        None => {
            let draft = TaskDraft {
                description,
                priority: priority.unwrap_or_default(),
                ..TaskDraft::default()
            };
            open_editor(editor, &draft).await?.into_new_task()
        }
    };
    let task = client.create(&input).await?;
    println!("{task}");
    Ok(())
}

async fn edit(client: &TaskClient, editor: &str, id: i64) -> color_eyre::Result<()> {
    let task = client
        .get(id)
        .await?
        .ok_or_else(|| eyre!("task #{id} not found"))?;
    let draft = open_editor(editor, &TaskDraft::from(&task)).await?;
    let updated = client
        .update(id, &draft.into_changes(task.is_completed))
        .await?
        .ok_or_else(|| eyre!("task #{id} not found"))?;
    println!("{updated}");
    Ok(())
}

async fn done(client: &TaskClient, id: i64, undo: bool) -> color_eyre::Result<()> {
    let task = client
        .get(id)
        .await?
        .ok_or_else(|| eyre!("task #{id} not found"))?;
    let updated = client
        .update(id, &task.changes().completed(!undo))
        .await?
        .ok_or_else(|| eyre!("task #{id} not found"))?;
    println!("{updated}");
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cmds = Cmd::parse();

    let cfg = match &cmds.config {
        Some(path) => Configuration::load_from(path)?,
        None => Configuration::load()?,
    };
    // The list UI owns the terminal, keep logs off it.
    if !matches!(cmds.commands, Commands::List { .. }) {
        init_tracing(&cfg.log.filter);
    }

    let client = TaskClient::new(cfg.client.api_url.as_str());
    match cmds.commands {
        Commands::Serve => serve(&cfg).await,
        Commands::List { status } => {
            let filter = match status {
                None => Filter::All,
                Some(StatusArg::Open) => Filter::Open,
                Some(StatusArg::Done) => Filter::Done,
            };
            list_ui::run(client, cfg.client.editor.clone(), filter).await
        }
        Commands::Add {
            title,
            description,
            priority,
        } => add(&client, &cfg.client.editor, title, description, priority).await,
        Commands::Edit { id } => edit(&client, &cfg.client.editor, id).await,
        Commands::Done { id, undo } => done(&client, id, undo).await,
        Commands::Remove { id } => {
            if client.delete(id).await? {
                println!("deleted #{id}");
                Ok(())
            } else {
                Err(eyre!("task #{id} not found"))
            }
        }
    }
}
