// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! E-Waste Scanner: webcam and upload classifier with a JSON item store

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use ewaste_scanner::classifier::ClassifierClient;
use ewaste_scanner::config::AppConfig;
use ewaste_scanner::store::{ItemFilter, ItemStore};
use ewaste_scanner::{Result, ScannerError};

/// E-Waste Scanner CLI
#[derive(Parser, Debug)]
#[command(name = "ewaste-scanner")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Classify e-waste from a webcam or upload and list it for recyclers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Classify a single image file and print the result
    Classify {
        /// Image to classify
        path: PathBuf,
    },

    /// Item store operations
    Items {
        #[command(subcommand)]
        action: ItemCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ItemCommands {
    /// Print every listed item
    List,

    /// Remove an item by id
    Delete {
        /// Item id (epoch milliseconds)
        id: i64,
    },

    /// Filter listed items
    Search {
        /// Substring of the product name
        #[arg(short = 's', long)]
        query: Option<String>,

        /// Toxicity level (High, Medium, Low)
        #[arg(short, long)]
        toxicity: Option<String>,

        /// Only recyclable (true) or non-recyclable (false) items
        #[arg(short, long)]
        recyclable: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => run_serve(config, host, port).await,
        Some(Commands::Classify { path }) => run_classify(config, &path).await,
        Some(Commands::Items { action }) => run_items_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action),
        None => run_serve(config, None, None).await,
    }
}

async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    info!("E-Waste Scanner v{}", env!("CARGO_PKG_VERSION"));
    ewaste_scanner::web::start_server(config).await
}

async fn run_classify(config: AppConfig, path: &Path) -> Result<()> {
    let client = ClassifierClient::new(config.classifier)?;
    info!("Classifying {:?} with {}", path, client.model());

    let result = client.classify(path).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_items_command(config: AppConfig, action: ItemCommands) -> Result<()> {
    let store = ItemStore::open(&config.storage.items_path)?;

    match action {
        ItemCommands::List => print_items(&store.load_all()),
        ItemCommands::Delete { id } => {
            if store.delete_by_id(&Value::from(id))? {
                println!("Deleted item {}", id);
                Ok(())
            } else {
                Err(ScannerError::NotFound(format!("Item not found: {}", id)))
            }
        }
        ItemCommands::Search { query, toxicity, recyclable } => {
            let filter = ItemFilter {
                query,
                toxicity_level: toxicity,
                recyclable,
            };
            print_items(&store.search(&filter))
        }
    }
}

fn print_items(items: &[Value]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(items)?);
    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!(
                "API key: {}",
                if config.classifier.api_key.is_empty() { "not set" } else { "set" }
            );
            Ok(())
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                return Err(ScannerError::Config(format!(
                    "{} already exists. Use --force to overwrite",
                    output.display()
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Wrote default configuration to {}", output.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["ewaste-scanner"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn test_cli_serve_overrides() {
        let cli = Cli::try_parse_from(["ewaste-scanner", "serve", "-H", "127.0.0.1", "--port", "8080"])
            .unwrap();

        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(8080));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_items_search() {
        let cli = Cli::try_parse_from([
            "ewaste-scanner", "items", "search", "-s", "laptop", "--recyclable", "true",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Items { action: ItemCommands::Search { query, toxicity, recyclable } }) => {
                assert_eq!(query.as_deref(), Some("laptop"));
                assert!(toxicity.is_none());
                assert_eq!(recyclable, Some(true));
            }
            _ => panic!("Expected Items Search command"),
        }
    }

    #[test]
    fn test_items_delete_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.items_path = dir.path().join("items.json").to_string_lossy().to_string();

        let err = run_items_command(config, ItemCommands::Delete { id: 1 }).unwrap_err();
        assert!(matches!(err, ScannerError::NotFound(_)));
    }

    #[test]
    fn test_config_generate_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("config.json");

        run_config_command(AppConfig::default(), ConfigCommands::Generate { output: output.clone(), force: false })
            .unwrap();
        assert!(output.exists());

        let err = run_config_command(
            AppConfig::default(),
            ConfigCommands::Generate { output: output.clone(), force: false },
        )
        .unwrap_err();
        assert!(matches!(err, ScannerError::Config(_)));

        run_config_command(AppConfig::default(), ConfigCommands::Generate { output, force: true }).unwrap();
    }
}
