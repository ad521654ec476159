use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use component_catalog::api::{self, SecurityConfig};
use component_catalog::{tree_render, Catalog, Database};

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Inventory catalog of components, their descriptions and change history")]
struct Cli {
    /// Path to the SQLite database (defaults to the platform data directory)
    #[arg(long, global = true, env = "COMPONENT_CATALOG_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Print the component hierarchy
    Tree,
    /// Find components matching every term
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Print the change history of a component
    History { component_id: Uuid },
    /// Scan the catalog for broken links
    Check,
}

/// Initialize tracing. Command output goes to stdout, so logs go to stderr
/// for everything except the server.
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "component_catalog=debug,tower_http=debug".into()),
    );

    if use_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_catalog(path: Option<PathBuf>) -> anyhow::Result<Catalog> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(Catalog::new(db))
}

async fn serve(catalog: Catalog, host: &str, port: u16) -> anyhow::Result<()> {
    let config = SecurityConfig::from_env();

    if let Some(limiter) = config.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }

    let app = api::create_router_with_config(catalog, config);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Component catalog listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(!serving);

    let catalog = open_catalog(cli.database)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => serve(catalog, &host, port).await?,
        None => serve(catalog, "127.0.0.1", 3000).await?,
        Some(Commands::Tree) => {
            let tree = catalog.tree()?;
            if tree.is_empty() {
                println!("(no components)");
            } else {
                print!("{}", tree_render::render_tree(&tree));
            }
        }
        Some(Commands::Search { terms }) => {
            for component in catalog.search(&terms.join(" "))? {
                println!(
                    "{}  {} ({}) [{}]",
                    component.id,
                    component.name,
                    component.kind,
                    component.status.as_str()
                );
            }
        }
        Some(Commands::History { component_id }) => {
            for entry in catalog.history(component_id)? {
                let subcomponent = entry
                    .subcomponent
                    .map(|s| format!(" -> {} ({})", s.name, s.id))
                    .unwrap_or_default();
                println!(
                    "{}  {:<24} {}{}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.action.as_str(),
                    entry.actor_id,
                    subcomponent
                );
            }
        }
        Some(Commands::Check) => {
            let report = catalog.check_integrity()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                anyhow::bail!("integrity check found {} issue(s)", report.issues.len());
            }
        }
    }

    Ok(())
}
