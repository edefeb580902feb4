use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use comicshelf::app::http::{AppState, router};
use comicshelf::app::service::ImportService;
use comicshelf::catalog::{CatalogStore, InMemoryCatalogStore, LocalFsCatalogStore};
use comicshelf::config::{ImportConfig, ResolverConfig};
use comicshelf::resolver::MetadataResolver;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Catalog directory.
    #[arg(long, default_value = "catalog-data")]
    data_dir: PathBuf,

    /// Keep the catalog in memory only (nothing is written to disk).
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    comicshelf::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting comicshelf-app");

    let resolver_config = ResolverConfig::from_env().context("load resolver config")?;
    let import_config = ImportConfig::from_env().context("load import config")?;
    tracing::info!(
        openbd = %resolver_config.openbd_url,
        ndl = %resolver_config.ndl_url,
        job_ttl_secs = import_config.job_ttl.map(|ttl| ttl.as_secs()),
        max_concurrent_jobs = import_config.max_concurrent_jobs,
        "loaded config"
    );

    let catalog: Arc<dyn CatalogStore> = if args.in_memory {
        tracing::info!("using in-memory catalog store");
        Arc::new(InMemoryCatalogStore::new())
    } else {
        tracing::info!(data_dir = %args.data_dir.display(), "using local filesystem catalog store");
        Arc::new(LocalFsCatalogStore::new(args.data_dir.clone()))
    };
    let resolver = MetadataResolver::from_config(&resolver_config)?;
    let service = Arc::new(ImportService::new(
        catalog,
        Arc::new(resolver),
        import_config,
    ));
    let _sweeper = service.spawn_sweeper();

    let app = router(AppState { service });

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
