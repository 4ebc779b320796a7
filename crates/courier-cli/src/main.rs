use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use courier_core::impls::LoggingBackend;
use courier_core::queue::InMemoryQueueFactory;
use courier_core::{RelayConfig, ServerBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// courier - push notification relay
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
struct Args {
    /// HTTP listen address (overrides COURIER_LISTEN_ADDR)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Service to register with a logging backend; repeatable
    #[arg(long = "service", default_value = "push")]
    services: Vec<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("courier=info,courier_core=info,push=info,tower_http=info")
    });
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = RelayConfig::from_env().context("failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    let shutdown_timeout = config.shutdown_timeout;

    let server = Arc::new(
        ServerBuilder::new()
            .config(config)
            .queue_factory(Arc::new(InMemoryQueueFactory::new()))
            .build()?,
    );
    for service in &args.services {
        server
            .register_service(Arc::new(LoggingBackend::new(service.as_str())))
            .await
            .with_context(|| format!("failed to register service {service}"))?;
    }

    let mut serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut serving => {
            // ingress ended on its own: listener failure
            let result = result.context("server task panicked")?;
            if let Err(err) = &result {
                error!(error = %err, "server stopped unexpectedly");
            }
            server.shutdown(shutdown_timeout).await?;
            return result.map_err(Into::into);
        }
    }

    server.shutdown(shutdown_timeout).await?;
    match serving.await {
        Ok(result) => result?,
        Err(err) => warn!(error = %err, "server task did not finish cleanly"),
    }
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
