//! site-guard binary: loads configuration, installs logging and metrics,
//! seeds an in-memory account store and serves the site until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use site_guard::auth::MemoryAuthService;
use site_guard::config::{load_config, SiteConfig};
use site_guard::lifecycle::{shutdown_signal, Shutdown};
use site_guard::observability::{logging, metrics};
use site_guard::security::random::{self, TokenEncoding};
use site_guard::SiteServer;

#[derive(Parser)]
#[command(name = "site-guard")]
#[command(about = "Personal site with a hardened request pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Username of the seeded admin account.
    #[arg(long, default_value = "admin")]
    admin_user: String,

    /// Password of the seeded admin account. A random one is generated and
    /// logged when omitted.
    #[arg(long)]
    admin_password: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SiteConfig::default(),
    };
    if cli.check_config {
        println!("configuration ok");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "site-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        csp_enabled = config.csp.enabled,
        login_limit_rpm = config.rate_limit.login.requests_per_minute,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let auth = Arc::new(MemoryAuthService::default());
    let password = match cli.admin_password {
        Some(password) => password,
        None => {
            let generated = random::token(18, TokenEncoding::UrlSafe)?;
            tracing::warn!(
                username = %cli.admin_user,
                password = %generated,
                "No admin password given; generated one"
            );
            generated
        }
    };
    auth.add_user(cli.admin_user, password);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = SiteServer::new(config, auth)?;

    let shutdown = Shutdown::new();
    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.trigger();
        })
    };

    server.run(listener, &shutdown).await?;
    signal.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
