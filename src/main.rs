mod collectors;
mod config;
mod http;
mod metrics;
mod snapshot;
mod stream;

use axum::serve;
use clap::Parser;
use collectors::Collector;
use config::Config;
use http::HttpAppState;
use metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "healthd")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<String>,
    /// Overrides `listen` from the config
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli) {
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

    let collector = Arc::new(Collector::new());
    info!(
        listen = %cfg.listen,
        boot_time = collector.boot_time(),
        cors_any_origin = cfg.cors.allows_any_origin(),
        interval_env = %cfg.stream.interval_env,
        "запуск healthd"
    );
    if cfg.cors.allows_any_origin() {
        info!("CORS открыт для всех источников; не используйте в недоверенной сети");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = HttpAppState {
        collector,
        metrics,
        stream: Arc::new(cfg.stream.clone()),
        shutdown: shutdown_rx,
    };
    let app = http::build_router(state, &cfg.cors);

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
            error!(error = %err, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let server = serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("получен сигнал остановки, закрываются потоки");
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = server.await {
        error!(error = %err, "ошибка HTTP-сервера");
        std::process::exit(1);
    }
    info!("healthd остановлен");
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(listen) = &cli.listen {
        cfg.listen = listen.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "не удалось дождаться Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(error = %err, "не удалось подписаться на SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_listen_overrides_defaults() {
        let cli = Cli::parse_from(["healthd", "--listen", "0.0.0.0:9100"]);
        let cfg = load_config(&cli).expect("конфигурация");
        assert_eq!(cfg.listen, "0.0.0.0:9100");
    }

    #[test]
    fn cli_rejects_invalid_listen() {
        let cli = Cli::parse_from(["healthd", "--listen", "nope"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["healthd", "--config", "/nonexistent/healthd.yaml"]);
        assert!(matches!(
            load_config(&cli),
            Err(config::ConfigError::Read { .. })
        ));
    }
}
