use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mongodb::bson::Bson;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listings_indexes::{
    api,
    catalog::{self, listings_indexes, listings_search_index},
    config::Config,
    provision::{self, Action, IndexStatus, ProvisionOptions},
    store::{IndexStore, MongoStore},
    AppState,
};

#[derive(Debug, Parser)]
#[command(name = "listings-indexes", version, about = "Manage the listings collection indexes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show what `apply` would change without touching the collection
    Plan {
        #[arg(long)]
        drop_deprecated: bool,
    },
    /// Create missing indexes in declaration order
    Apply {
        /// Drop indexes the catalog marks as deprecated
        #[arg(long)]
        drop_deprecated: bool,
        /// Also create the Atlas Search index
        #[arg(long)]
        with_search_index: bool,
    },
    /// Check the collection against the catalog; exits non-zero on drift
    Verify {
        #[arg(long)]
        with_search_index: bool,
    },
    /// Print the createIndexes documents (or the search definition) as JSON
    Render {
        #[arg(long)]
        search: bool,
    },
    /// Serve the index status API
    Serve,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Render { search } => render(search),
        command => run(command).await,
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "listings-indexes starting");

    let config = Config::load()?;
    info!(
        uri = %config.mongodb.redacted_uri(),
        database = %config.mongodb.database,
        collection = %config.mongodb.collection,
        "Loaded configuration"
    );

    let store = MongoStore::connect(&config.mongodb)
        .await
        .context("Failed to connect to MongoDB")?;
    let catalog = listings_indexes();
    let mut options = ProvisionOptions::from(&config.provision);

    match command {
        Command::Plan { drop_deprecated } => {
            options.drop_deprecated |= drop_deprecated;
            let plan = provision::plan(&store, &catalog, &options).await?;
            for step in &plan.steps {
                match &step.action {
                    Action::Conflict { existing } => warn!(
                        index = %step.name,
                        existing = %existing.to_json(),
                        "conflict"
                    ),
                    action => info!(index = %step.name, "{}", action.label()),
                }
            }
            for index in &plan.unmanaged {
                info!(index = %index.effective_name(), "unmanaged");
            }
            info!(
                pending = plan.pending(),
                conflicts = plan.conflicts().count(),
                "Plan complete"
            );
        }
        Command::Apply {
            drop_deprecated,
            with_search_index,
        } => {
            options.drop_deprecated |= drop_deprecated;
            if with_search_index {
                options.search_index = Some(config.provision.search_index_name.clone());
            }
            let report = provision::apply(&store, &catalog, &options).await?;
            info!(
                created = report.created.len(),
                kept = report.kept.len(),
                dropped = report.dropped.len(),
                conflicts = report.conflicts.len(),
                search = ?report.search,
                "Apply complete"
            );
            if !report.is_clean() {
                bail!(
                    "{} declared index(es) conflict with existing indexes: {}",
                    report.conflicts.len(),
                    report.conflicts.join(", ")
                );
            }
        }
        Command::Verify { with_search_index } => {
            let search_index = (with_search_index || config.provision.apply_search_index)
                .then_some(config.provision.search_index_name.as_str());
            let report = provision::verify(&store, &catalog, search_index).await?;
            for check in &report.indexes {
                match &check.status {
                    IndexStatus::Present => info!(index = %check.name, "present"),
                    IndexStatus::Missing if check.deprecated => {
                        info!(index = %check.name, "missing (deprecated)")
                    }
                    IndexStatus::Missing => warn!(index = %check.name, "missing"),
                    IndexStatus::Mismatch { existing } => warn!(
                        index = %check.name,
                        existing = %existing.to_json(),
                        "mismatch"
                    ),
                }
            }
            if let Some(search) = &report.search {
                info!(index = %search.name, status = ?search.status, "search index");
            }
            if !report.is_satisfied() {
                bail!(
                    "collection {} does not match the declared indexes",
                    config.mongodb.collection
                );
            }
            info!("All declared indexes are present");
        }
        Command::Serve => serve(config, catalog, Arc::new(store)).await?,
        Command::Render { search } => render(search)?,
    }

    Ok(())
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Rendering needs no database, so stdout carries nothing but the JSON.
fn render(search: bool) -> anyhow::Result<()> {
    let rendered = if search {
        listings_search_index().to_json()?
    } else {
        let indexes: Vec<Bson> = listings_indexes()
            .iter()
            .map(|spec| Bson::Document(spec.to_document()))
            .collect();
        Bson::Document(mongodb::bson::doc! {
            "createIndexes": catalog::LISTINGS_COLLECTION,
            "indexes": indexes,
        })
        .into_relaxed_extjson()
    };

    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

async fn serve(
    config: Config,
    catalog: Vec<catalog::IndexSpec>,
    store: Arc<dyn IndexStore>,
) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState {
        config,
        catalog,
        store,
    });

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
