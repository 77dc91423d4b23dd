//! spaces -- command-line client for S3-compatible object storage.
//!
//! Reads a YAML configuration (values may reference environment variables
//! as `$NAME`), runs one operation and exits.  Ctrl+C or SIGTERM cancels
//! the operation in flight.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spaces_client::config::{load_config, LoggingConfig};
use spaces_client::{Acl, Client, EnvResolver, PutPayload, PutRequest};

/// Command-line arguments for the spaces client.
#[derive(Parser, Debug)]
#[command(
    name = "spaces",
    version,
    about = "Command-line client for S3-compatible object storage"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "spaces.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file.
    Put {
        file: PathBuf,
        key: String,
        /// Content type; guessed from the key when omitted.
        #[arg(long)]
        content_type: Option<String>,
        /// private or public-read; defaults to the configured ACL.
        #[arg(long)]
        acl: Option<Acl>,
    },
    /// Download an object to a file or stdout.
    Get {
        key: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print an object's metadata as JSON.
    Head { key: String },
    /// Delete an object.
    Rm { key: String },
    /// Delete every object under a prefix.
    RmPrefix { prefix: String },
    /// List objects as JSON lines.
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Server-side copy.
    Cp { src: String, dst: String },
    /// Copy then delete the source.
    Mv { src: String, dst: String },
    /// Print the public URL of a key.
    Url { key: String },
    /// Print a presigned GET URL.
    Presign {
        key: String,
        /// Lifetime in seconds (at most 604800).
        #[arg(long, default_value_t = 3600)]
        expires: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    init_tracing(&config.logging);
    spaces_client::metrics::describe_metrics();
    info!("Loaded configuration from {}", cli.config);

    let (client_config, credentials) = config.client_config(&EnvResolver)?;
    let client = Client::new(client_config, credentials)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    run(&client, cli.command, &cancel).await
}

async fn run(client: &Client, command: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Put {
            file,
            key,
            content_type,
            acl,
        } => {
            let mut request = PutRequest::new(key, PutPayload::from_file(&file).await?);
            if let Some(content_type) = content_type {
                request = request.with_content_type(content_type);
            }
            if let Some(acl) = acl {
                request = request.with_acl(acl);
            }
            let meta = client.put(request, cancel).await?;
            println!("{}", serde_json::to_string(&meta)?);
        }
        Command::Get { key, output } => {
            let mut reader = client.get(&key, cancel).await?.into_async_read();
            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    tokio::io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Head { key } => {
            let meta = client.head(&key, cancel).await?;
            println!("{}", serde_json::to_string(&meta)?);
        }
        Command::Rm { key } => client.delete(&key, cancel).await?,
        Command::RmPrefix { prefix } => {
            let deleted = client.delete_prefix(&prefix, cancel).await?;
            println!("{deleted}");
        }
        Command::Ls { prefix } => {
            let mut listing = client.list(&prefix, cancel)?;
            while let Some(meta) = listing.try_next().await? {
                println!("{}", serde_json::to_string(&meta)?);
            }
        }
        Command::Cp { src, dst } => client.copy(&src, &dst, cancel).await?,
        Command::Mv { src, dst } => client.rename(&src, &dst, cancel).await?,
        Command::Url { key } => println!("{}", client.root_url(&key)?),
        Command::Presign { key, expires } => {
            let url =
                client.presigned_url(reqwest::Method::GET, &key, Duration::from_secs(expires))?;
            println!("{url}");
        }
    }
    Ok(())
}

/// Install the tracing subscriber.  `RUST_LOG` wins over the configured level.
/// Logs go to stderr so command output stays pipeable.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received SIGINT, cancelling");
        },
        _ = terminate => {
            warn!("Received SIGTERM, cancelling");
        },
    }
}
