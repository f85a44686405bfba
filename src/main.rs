use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use bindery::config::ServerConfig;
use bindery::{rest, AppContext};

#[derive(Parser, Debug)]
#[command(name = "bindery", about = "Folder session daemon for a markdown book editor", version)]
struct Args {
    /// Data directory (database, sites, artifacts, images, config.toml)
    #[arg(long, env = "BINDERY_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Bind address
    #[arg(long, env = "BINDERY_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Listen port
    #[arg(long, short, env = "BINDERY_PORT")]
    port: Option<u16>,

    /// Build command run against session folders
    #[arg(long, env = "BINDERY_BUILD_COMMAND")]
    build_command: Option<String>,

    /// Log filter, e.g. "info" or "debug,bindery=trace"
    #[arg(long, env = "BINDERY_LOG")]
    log: Option<String>,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, env = "BINDERY_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(&args.data_dir)?;
    if let Some(v) = args.bind_address {
        config.bind_address = v;
    }
    if let Some(v) = args.port {
        config.port = v;
    }
    if let Some(v) = args.build_command {
        config.build_command = v;
    }
    if let Some(v) = args.log {
        config.log = v;
    }

    // Stdout always; optionally a daily-rotated file as well. The appender
    // guard must outlive the server so buffered lines are flushed on exit.
    let (file_layer, _guard) = match args.log_file {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::daily(dir, "bindery.log"),
            );
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    let ctx = AppContext::init(config).await?;
    rest::serve(ctx).await
}
