//! krelayd: UDP relay router daemon.
//!
//! Binds the outer and inner sockets and drives the router on a fixed
//! tick until interrupted.

use clap::Parser;
use krelay::utils::time::now_ms;
use krelay::{Config, ConfigError, Router};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "krelayd",
    about = "UDP relay router bridging public game clients and private game servers",
    version
)]
struct Args {
    /// Path to a config file, bypassing the standard search paths
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    show_config: bool,

    /// Driver tick interval in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    match &args.config {
        Some(path) => Config::load_file(path),
        None => {
            let (config, loaded) = Config::load()?;
            for path in &loaded {
                info!(path = %path.display(), "Loaded config file");
            }
            Ok(config)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if args.show_config {
        match config.to_yaml() {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                error!(error = %e, "Failed to render configuration");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut router = match Router::bind(config) {
        Ok(router) => router,
        Err(e) => {
            error!(error = %e, "Failed to start router");
            std::process::exit(1);
        }
    };

    info!(
        outer_addr = %router.outer_addr(),
        inner_addr = %router.inner_addr(),
        tick_ms = args.tick_ms,
        "krelayd running"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                router.update(now_ms());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                router.close();
                break;
            }
        }
    }
}
