//! LogLedger aggregation server binary

use clap::Parser;
use logledger::config::{Output, Rotation, ServerConfig};
use logledger::server::{LogServer, ManagementConsole};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "logledger-server")]
#[command(about = "Structured log aggregation server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind the ingress listener to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the ingress listener to
    #[arg(long)]
    port: Option<u16>,

    /// Admin unix socket path
    #[arg(long)]
    unix_socket: Option<PathBuf>,

    /// Token database file
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Statistics database file
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Log filename stem, without date suffix and extension
    #[arg(long)]
    filestem: Option<String>,

    /// Folder to store logfiles in
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Log rotation mode: {none|daily|weekly|monthly|annually}
    #[arg(long)]
    rotation: Option<String>,

    /// Log output mode: {file|stdout|both}
    #[arg(long)]
    output: Option<String>,

    /// Write column headers into new logfiles
    #[arg(long)]
    headers: Option<bool>,

    /// Write file entries encoded as JSON
    #[arg(long)]
    json: Option<bool>,

    /// Compress rotated logfiles
    #[arg(long)]
    compress: Option<bool>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if args.verbose {
            "logledger=debug,info"
        } else {
            "logledger=info,warn,error"
        })
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Err(e) = run(args).await {
        error!("could not start log server: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> logledger::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => {
            info!("no config file given, using defaults");
            ServerConfig::default()
        }
    };

    // CLI arguments override the config file
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(socket) = args.unix_socket {
        config.unix_socket = socket;
    }
    if let Some(tokens) = args.tokens {
        config.token_file = tokens;
    }
    if let Some(stats) = args.stats {
        config.stats_file = stats;
    }
    if let Some(filestem) = args.filestem {
        config.logger.filestem = filestem;
    }
    if let Some(folder) = args.folder {
        config.logger.folder = folder;
    }
    if let Some(rotation) = args.rotation {
        config.logger.rotation = rotation.parse::<Rotation>()?;
    }
    if let Some(output) = args.output {
        config.logger.output = output.parse::<Output>()?;
    }
    if let Some(headers) = args.headers {
        config.logger.headers = headers;
    }
    if let Some(json) = args.json {
        config.logger.json = json;
    }
    if let Some(compress) = args.compress {
        config.logger.compress = compress;
    }

    config.validate()?;

    info!("starting logledger-server v{}", env!("CARGO_PKG_VERSION"));
    info!("ingress: {}:{}", config.host, config.port);
    info!("admin socket: {}", config.unix_socket.display());
    info!("log folder: {}", config.logger.folder.display());

    let mut server = LogServer::new(config, ManagementConsole::new()).await?;
    info!("log server is running on {}", server.local_addr());

    match server.kill_switch() {
        Some(mut kill_rx) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received interrupt signal, quitting"),
                _ = kill_rx.recv() => info!("received killswitch signal, quitting"),
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt signal, quitting");
        }
    }

    server.quit().await;
    info!("log server has been shut down");
    Ok(())
}
