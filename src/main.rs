use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use walletbridge::chains::ChainRegistry;
use walletbridge::config::{Config, StoreBackend};
use walletbridge::hooks::{AddressBook, HookDispatcher, LogHook};
use walletbridge::session::service::SessionService;
use walletbridge::session::store::{MemorySessionStore, SessionStore};
use walletbridge::verifier::RpcVerifier;
use walletbridge::web::{AppState, spawn_expiry_sweeper, start_server};

#[derive(Parser)]
#[command(name = "walletbridge", about = "Signing-session gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the signing API server.
    Serve {
        /// Bind host (overrides BRIDGE_HOST).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides BRIDGE_PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// List the configured chain registry.
    Chains,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::resolve().context("failed to resolve configuration")?;
    let chains = load_chains(&config)?;

    match cli.command {
        Command::Chains => {
            for (chain_ref, chain) in chains.refs() {
                println!(
                    "{chain_ref}\t{} (network {})\t{}",
                    chain.name, chain.network_id, chain.rpc_url
                );
            }
            Ok(())
        }
        Command::Serve { host, port } => {
            serve(config, Arc::new(chains), host, port).await
        }
    }
}

fn load_chains(config: &Config) -> anyhow::Result<ChainRegistry> {
    match &config.chains_file {
        Some(path) => ChainRegistry::from_file(path)
            .with_context(|| format!("failed to load chain registry from {}", path.display())),
        None => Ok(ChainRegistry::with_defaults()),
    }
}

async fn serve(
    config: Config,
    chains: Arc<ChainRegistry>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let store = build_store(&config).await?;
    let verifier = Arc::new(
        RpcVerifier::new(Duration::from_secs(config.rpc_timeout_secs))
            .context("failed to build RPC verifier")?,
    );

    let mut hooks = HookDispatcher::new();
    hooks.register_any(Arc::new(AddressBook::new()));
    hooks.register_any(Arc::new(LogHook));

    let service = Arc::new(SessionService::new(
        store,
        chains,
        verifier,
        Arc::new(hooks),
        chrono::Duration::seconds(config.session_ttl_secs),
    ));

    let sweeper = spawn_expiry_sweeper(service.clone(), config.expiry_sweep_secs);

    let host = host.unwrap_or(config.host);
    let port = port.unwrap_or(config.port);
    let (bound, shutdown) = start_server(AppState { service }, &host, port)
        .await
        .context("failed to start server")?;
    tracing::info!(%bound, "walletbridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    sweeper.abort();
    let _ = shutdown.send(());
    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        #[cfg(feature = "libsql")]
        StoreBackend::LibSql => {
            let path = &config.store.libsql_path;
            tracing::info!(path = %path.display(), "using libSQL session store");
            let store = walletbridge::session::libsql::LibSqlSessionStore::new_local(path)
                .await
                .with_context(|| {
                    format!("failed to open session database at {}", path.display())
                })?;
            Ok(Arc::new(store))
        }
    }
}
