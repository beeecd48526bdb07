use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use file_provisioning::backend::{Columns, RowStoreFactory};
use file_provisioning::config::AppConfig;
use file_provisioning::error::AppError;
use file_provisioning::monitor::{Monitor, TracingMonitor};

#[derive(Parser, Debug)]
#[command(name = "file-provisioning")]
#[command(about = "Inspect and maintain a comma-delimited provisioning store")]
struct Args {
    /// Configuration file path (default: config.yaml)
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data file and its sidecar if they are missing
    Init,
    /// Print rows as JSON lines, optionally filtered by column=value pairs
    Rows {
        #[arg(long = "where", value_parser = parse_condition)]
        conditions: Vec<(String, String)>,
    },
    /// Remove every row with the given key
    Delete { key: String },
}

fn parse_condition(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Expected column=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config =
        if args.config == "config.yaml" && !std::path::Path::new("config.yaml").exists() {
            tracing::info!("No config.yaml found, using the default store in the current directory");
            AppConfig::default_config()
        } else {
            AppConfig::load_from_file(&args.config)?
        };

    let store_config = app_config.store_config();
    let monitor: Arc<dyn Monitor> = Arc::new(TracingMonitor);
    let store = RowStoreFactory::open(&store_config, monitor).await?;

    match args.command {
        Command::Init => {
            tracing::info!(
                "Store ready at {} with columns: {}",
                store_config.file_path().display(),
                store.header().join(", ")
            );
        }
        Command::Rows { conditions } => {
            let columns: Columns = conditions.into_iter().collect();
            for row in store.query(&columns).await? {
                let line = serde_json::to_string(&row).map_err(AppError::from)?;
                println!("{}", line);
            }
        }
        Command::Delete { key } => {
            store.remove_row(&key).await?;
            tracing::info!("Removed rows with key {}", key);
        }
    }

    Ok(())
}
