mod collectors;
mod config;
mod http;
mod metrics;
mod security;
mod snapshot;

use axum::serve;
use clap::Parser;
use collectors::Collector;
use config::Config;
use metrics::Metrics;
use std::fs::DirBuilder;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "statusd")]
#[command(version)]
struct Cli {
    /// Overrides STATUSD_LISTEN.
    #[arg(long)]
    listen: Option<String>,
    /// Overrides STATUSD_DATA_DIR.
    #[arg(long)]
    data_dir: Option<String>,
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    if cli.print_config {
        match cfg.to_yaml() {
            Ok(yaml) => {
                print!("{yaml}");
                return;
            }
            Err(err) => {
                error!(error = %err, "не удалось сериализовать конфигурацию");
                std::process::exit(1);
            }
        }
    }

    if let Err(err) = ensure_data_dir(&cfg.data_dir) {
        error!(error = %err, data_dir = %cfg.data_dir.display(), "не удалось создать каталог данных");
        std::process::exit(1);
    }

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(cfg.listen.as_str()).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    info!(
        listen = %cfg.listen,
        cache_ttl = %humantime::format_duration(cfg.cache_ttl()),
        data_dir = %cfg.data_dir.display(),
        wg_subnet = %cfg.wg_subnet,
        "запуск statusd"
    );

    let collector = Arc::new(Collector::new(&cfg, metrics.clone()));
    let app = http::build_router(metrics, collector);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http_task = tokio::spawn(async move {
        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "ошибка HTTP-сервера");
        }
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut cfg = Config::from_env()?;
    if let Some(listen) = &cli.listen {
        cfg.listen = config::normalize_listen(listen);
    }
    if let Some(data_dir) = &cli.data_dir {
        cfg.data_dir = data_dir.into();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn ensure_data_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path)
}
