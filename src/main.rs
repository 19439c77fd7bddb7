use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use netdisco_dns_bridge::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "netdisco-dns-bridge", version, about = "Netdisco DNS/HTTP bridge")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", default_value = "config/example.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = AppConfig::load(&cli.config).with_context(|| format!("could not load config: {}", cli.config))?;

    init_logging(&cfg.log)?;

    tracing::info!(entries = cfg.entries.len(), "loaded configuration");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_cancel.cancel();
    });

    netdisco_dns_bridge::run(cfg, cancel).await
}

fn init_logging(cfg: &netdisco_dns_bridge::config::LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(!cfg.no_color);

    if cfg.in_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return,
    };
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
}
