use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connection_manager::{DispatcherHub, NullLink, RemoteChannel, ServiceManager};
use router_link::TcpRouterLink;
use service_directory::COOKIE_LOCAL;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "crosswire")]
#[command(about = "Crosswire - role-name service wiring node")]
#[command(version)]
struct Cli {
    /// Router configuration file path
    #[arg(short, long, global = true, default_value = "router.init")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the router configuration file
    Validate,

    /// Run a node and keep it wired to the router
    Run {
        /// Router host override
        #[arg(long, requires = "port")]
        host: Option<String>,

        /// Router port override
        #[arg(long, requires = "host")]
        port: Option<u16>,

        /// Do not mirror registrations to a router
        #[arg(long)]
        local_only: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    smol::block_on(async {
        let cli = Cli::parse();

        match cli.command {
            Commands::Validate => validate(&cli.config).await,
            Commands::Run {
                host,
                port,
                local_only,
            } => run(&cli.config, host, port, local_only).await,
        }
    })
}

async fn validate(config: &Path) -> Result<()> {
    let settings = router_link::parse_file(config)
        .with_context(|| format!("invalid router configuration {}", config.display()))?;

    if settings.is_remote_enabled() {
        println!(
            "configuration is valid, router `{}` at {}",
            settings.name,
            settings.endpoint()
        );
    } else {
        println!("configuration is valid, remote routing is off");
    }
    Ok(())
}

async fn run(
    config: &Path,
    host: Option<String>,
    port: Option<u16>,
    local_only: bool,
) -> Result<()> {
    let hub = Arc::new(DispatcherHub::new());
    let link: Box<dyn RemoteChannel> = if local_only {
        Box::new(NullLink::new())
    } else {
        Box::new(TcpRouterLink::new(COOKIE_LOCAL))
    };
    let manager = ServiceManager::start(hub, link, COOKIE_LOCAL);

    if local_only {
        info!("node is up, serving this process only");
    } else {
        match (host, port) {
            (Some(host), Some(port)) => manager.start_routing_at(&host, port)?,
            _ => manager.start_routing(Some(config)),
        }
        info!("node is up");
    }

    // The node stays wired until the process is terminated.
    futures::future::pending::<()>().await;
    Ok(())
}
