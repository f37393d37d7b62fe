mod collectors;
mod config;
mod http;
mod metrics;
mod persist;
mod snapshot;
mod state;

use axum::serve;
use clap::Parser;
use collectors::{run_collector, Collector};
use config::{Config, Overrides};
use metrics::Metrics;
use persist::Persister;
use state::Store;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysdashd")]
#[command(version)]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, env = "SYSDASH_PORT")]
    port: Option<u16>,
    #[arg(long, env = "SYSDASH_OUTDIR")]
    out_dir: Option<PathBuf>,
    /// Sampling interval, e.g. `2s` or `500ms`.
    #[arg(long, env = "SYSDASH_INTERVAL", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let base = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Ok(Config::default()),
    };
    let overrides = Overrides {
        port: cli.port,
        out_dir: cli.out_dir,
        interval: cli.interval,
    };
    let cfg = match base.and_then(|cfg| cfg.with_overrides(overrides)) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %addr, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let store = Arc::new(Store::new(cfg.history_len));
    let persister = Persister::new(&cfg.out_dir, &cfg.out_file);

    info!(
        listen = %addr,
        interval = %humantime::format_duration(cfg.interval),
        output = %persister.target().display(),
        history_len = store.capacity(),
        "запуск sysdashd"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let app = http::build_router(
            metrics.clone(),
            store.clone(),
            persister.target().to_path_buf(),
        );
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let collector_task = {
        let collector = Collector::new(cfg.probe_paths());
        tokio::spawn(run_collector(
            collector,
            store.clone(),
            persister,
            metrics.clone(),
            cfg.interval,
            shutdown_rx,
        ))
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    let _ = collector_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
