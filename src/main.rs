//! `pathserve` binary: serves the example endpoints over HTTP, or HTTPS when
//! a certificate and private key are given.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pathserve::config::ServerConfig;
use pathserve::dispatch::Dispatcher;
use pathserve::endpoints;
use pathserve::router::RouteTable;
use pathserve::server::Server;

#[derive(Parser, Debug)]
#[command(name = "pathserve")]
#[command(version, about = "Minimal HTTP/HTTPS server with path handlers", long_about = None)]
struct Cli {
    /// TCP port to listen on
    port: u16,

    /// PEM certificate chain; enables TLS
    #[arg(requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key matching the certificate
    key: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory holding the example endpoint templates
    #[arg(long, default_value = "assets")]
    assets: PathBuf,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(self.port);
        config.host = self.host.clone();
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => config.with_tls(cert, key),
            _ => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pathserve=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut routes = RouteTable::with_default_paths();
    endpoints::register_all(&mut routes, &cli.assets)?;
    let dispatcher = Dispatcher::new(routes, endpoints::defaults()?);

    let config = cli.server_config();
    Server::from_config(&config, dispatcher).await?.run().await?;
    Ok(())
}
