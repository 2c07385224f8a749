use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use offline_sw::dispatch::DEFAULT_QUEUE_SIZE;
use offline_sw::proxy::{self, HostWorker};
use offline_sw::{
    AppConfig, CacheStorage, DiskCacheStorage, Error, HttpFetcher, MemoryCacheStorage,
    ServiceWorker, StorageKind, WorkerHandle,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageArg {
    Memory,
    Disk,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Memory => Self::Memory,
            StorageArg::Disk => Self::Disk,
        }
    }
}

#[derive(Parser)]
#[command(name = "offline-sw")]
#[command(version)]
#[command(about = "Offline caching proxy with service-worker fetch policies")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin of the proxied web application
    #[arg(short, long)]
    origin: Option<String>,

    /// Proxy bind address
    #[arg(long)]
    host: Option<String>,

    /// Proxy port
    #[arg(short, long)]
    port: Option<u16>,

    /// Cache storage backend
    #[arg(long, value_enum)]
    storage: Option<StorageArg>,

    /// Root directory for disk storage
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(origin) = self.origin {
            config.worker.origin = origin;
        }
        if let Some(host) = self.host {
            config.proxy.host = host;
        }
        if let Some(port) = self.port {
            config.proxy.port = port;
        }
        if let Some(storage) = self.storage {
            config.storage.kind = storage.into();
        }
        if let Some(dir) = self.cache_dir {
            config.storage.dir = dir;
        }
    }
}

fn build_storage(config: &AppConfig) -> Arc<dyn CacheStorage> {
    match config.storage.kind {
        StorageKind::Memory => Arc::new(MemoryCacheStorage::new()),
        StorageKind::Disk => {
            log::info!("Disk cache storage at {}", config.storage.dir.display());
            Arc::new(DiskCacheStorage::new(&config.storage.dir))
        }
    }
}

#[tokio::main]
async fn main() -> offline_sw::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.worker.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.proxy.host, config.proxy.port)
        .parse()
        .map_err(|e| Error::Config(format!("listen address: {e}")))?;

    let worker: Arc<HostWorker> = Arc::new(ServiceWorker::new(
        config.worker.clone(),
        build_storage(&config),
        HttpFetcher::new()?,
    )?);
    let (handle, event_loop) = WorkerHandle::spawn(Arc::clone(&worker), DEFAULT_QUEUE_SIZE);
    handle.start().await?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Proxying http://{addr} -> {}", config.worker.origin);

    axum::serve(listener, proxy::router(worker, handle))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;

    // The router held the last handles; the loop drains in-flight work and exits.
    let _ = event_loop.await;
    Ok(())
}
