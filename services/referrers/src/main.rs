//! Registry server with the artifact referrers extension

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::WrapErr;
use referrers::{ExtensionRegistry, RegistryBuilder, RegistryConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "registry-server", about = "Artifact registry server", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let document = tokio::fs::read_to_string(path)
                .await
                .wrap_err_with(|| format!("reading {path}"))?;
            RegistryConfig::from_toml(&document).wrap_err_with(|| format!("parsing {path}"))?
        }
        None => RegistryConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let shutdown = CancellationToken::new();
    let storage = config.storage.build()?;
    let app = RegistryBuilder::new(storage)
        .extensions_from_config(&ExtensionRegistry::with_defaults(), &config.extensions)?
        .shutdown(shutdown.clone())
        .build();

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .wrap_err_with(|| format!("binding {}", config.listen))?;
    tracing::info!("registry listening on http://{}", config.listen);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "unable to listen for shutdown signal");
                return;
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
