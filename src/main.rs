//! # Iglu Resolver CLI (`iglu`)
//!
//! The `iglu` binary discovers schema registries (workspace folders,
//! authenticated organizations, static repositories) and answers queries
//! against the combined index.
//!
//! ## Usage
//!
//! ```bash
//! iglu --config ./config/iglu.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `iglu registries` | Discover and list all schema sources |
//! | `iglu schemas` | List schema descriptors matching filters |
//! | `iglu vendors` | List distinct vendor names |
//! | `iglu resolve <uri>` | Resolve an Iglu URI to its schema body |
//! | `iglu watch` | Keep the index fresh as files and sessions change |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iglu_resolver::config::{load_config, Config};
use iglu_resolver::console::ConsoleClient;
use iglu_resolver::http::HttpClient;
use iglu_resolver::providers::FileAccess;
use iglu_resolver::selector::Selector;
use iglu_resolver::service::SchemaService;
use iglu_resolver::workspace::WorkspaceFiles;

/// Iglu Resolver — resolve Iglu schema references across workspace,
/// organization, and static registries.
#[derive(Parser)]
#[command(
    name = "iglu",
    about = "Resolve Iglu schema references across workspace, organization, and static registries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file falls back to
    /// built-in defaults (Iglu Central + current directory).
    #[arg(long, global = true, default_value = "./config/iglu.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and list all schema sources.
    Registries,

    /// List schema descriptors matching the given filters.
    Schemas {
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        version: Option<String>,
        /// Registry kind: workspace, organization, or static.
        #[arg(long)]
        registry_kind: Option<String>,
        #[arg(long)]
        registry_id: Option<String>,
        /// Environment: LOCAL, DEV, or PROD.
        #[arg(long)]
        env: Option<String>,
    },

    /// List distinct vendor names, optionally within one registry.
    Vendors {
        #[arg(long)]
        registry_id: Option<String>,
    },

    /// Resolve an Iglu URI to its schema body and print it.
    Resolve {
        /// Full reference, e.g. `iglu:com.acme/checkout/jsonschema/1-0-0`.
        uri: String,
    },

    /// Run discovery, then keep the index fresh as workspace files and
    /// sessions change. Stops on ctrl-c.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        Config::default()
    };

    let timeout = Duration::from_secs(config.discovery.http_timeout_secs);
    let files = Arc::new(WorkspaceFiles::new(&config.workspace.roots)?);
    let sessions = Arc::new(ConsoleClient::new(&config.console, timeout)?);
    let http = Arc::new(HttpClient::new(timeout)?);

    let service = SchemaService::new(
        sessions,
        Arc::clone(&files) as Arc<dyn FileAccess>,
        http,
        &config,
    );

    match cli.command {
        Commands::Registries => {
            service.discover().await;
            let registries = service.registries();
            if registries.is_empty() {
                println!("No registries discovered.");
                return Ok(());
            }
            println!("{:<14} {:<40} NAME", "KIND", "ID");
            for registry in registries {
                println!(
                    "{:<14} {:<40} {}",
                    registry.kind(),
                    registry.id(),
                    registry.name()
                );
            }
        }

        Commands::Schemas {
            vendor,
            name,
            format,
            version,
            registry_kind,
            registry_id,
            env,
        } => {
            service.discover().await;

            let mut uri_fields = Selector::new();
            if let Some(vendor) = vendor {
                uri_fields = uri_fields.field("vendor", vendor);
            }
            if let Some(name) = name {
                uri_fields = uri_fields.field("name", name);
            }
            if let Some(format) = format {
                uri_fields = uri_fields.field("format", format);
            }
            if let Some(version) = version {
                uri_fields = uri_fields.field("version", version);
            }

            let mut registry_fields = Selector::new();
            if let Some(kind) = registry_kind {
                registry_fields = registry_fields.field("kind", kind);
            }
            if let Some(id) = registry_id {
                registry_fields = registry_fields.field("id", id);
            }

            let mut selector = Selector::new();
            if !uri_fields.is_empty() {
                selector = selector.field("uri", uri_fields);
            }
            if !registry_fields.is_empty() {
                selector = selector.field("registry", registry_fields);
            }
            if let Some(env) = env {
                selector = selector.field("env", env.to_uppercase());
            }

            let filter = if selector.is_empty() {
                None
            } else {
                Some(&selector)
            };

            let schemas = service.get_schemas(filter);
            if schemas.is_empty() {
                println!("No matching schemas.");
                return Ok(());
            }
            println!("{:<60} {:<6} {:<14} HASH", "URI", "ENV", "REGISTRY");
            for schema in schemas {
                println!(
                    "{:<60} {:<6} {:<14} {}",
                    schema.uri.to_string(),
                    schema.env,
                    schema.registry.kind(),
                    &schema.hash[..12]
                );
            }
        }

        Commands::Vendors { registry_id } => {
            service.discover().await;

            let selector = registry_id.map(|id| {
                Selector::new().field("registry", Selector::new().field("id", id))
            });

            let vendors = service.query_schemas(
                |mut acc: std::collections::BTreeSet<String>, schema| {
                    acc.insert(schema.uri.vendor.clone());
                    acc
                },
                std::collections::BTreeSet::new(),
                selector.as_ref(),
            );

            for vendor in vendors {
                println!("{}", vendor);
            }
        }

        Commands::Resolve { uri } => {
            service.discover().await;
            let body = service.resolve(uri.as_str()).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Watch => {
            service.discover().await;
            if config.workspace.watch_poll_secs > 0 {
                let _ = files.spawn_watcher(Duration::from_secs(config.workspace.watch_poll_secs));
            }
            let watcher = service.watch_for_changes();
            println!(
                "Watching {} schemas across {} registries. Press ctrl-c to stop.",
                service.get_schemas(None).len(),
                service.registries().len()
            );
            tokio::signal::ctrl_c().await?;
            watcher.abort();
        }
    }

    Ok(())
}
