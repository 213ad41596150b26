//! echo-beacon: a diagnostic HTTP echo server
//!
//! Every request is answered with a plain-text rendering of itself:
//! request line, host, headers and the raw body. Useful for checking what
//! actually reaches a service through proxies, load balancers and meshes.
//!
//! Features:
//! - Catch-all HTTP/1.1 echo on any method and path
//! - Optional one-shot announcement to a Consul-compatible service catalog
//! - Optional or mandatory registration policy
//! - Configuration via CLI arguments or TOML file

mod config;
mod echo;
mod registry;
mod server;

use config::Config;
use server::Server;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        registry = config.registry.url.as_deref().unwrap_or("none"),
        registry_required = config.registry.required,
        "{} listen and serve at {}",
        config.identity.name,
        config.address
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = match builder.enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Announce, bind and serve until a shutdown signal arrives.
async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = registry::announce(&config.registry, &config.identity).await?;
    debug!(?outcome, registered = outcome.is_registered(), "Announcement finished");

    let server = Server::bind(&config.address).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = shutdown_signal() => info!("Shutdown signal received, exiting"),
    }

    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegistryConfig, ServiceIdentity};
    use crate::registry::AnnounceOutcome;

    #[tokio::test]
    async fn test_starts_without_reachable_registry() {
        // Reserve a port and release it so nothing answers there
        let unreachable = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let registry = RegistryConfig {
            url: Some(format!("http://{unreachable}")),
            required: false,
            token: None,
            datacenter: None,
        };
        let identity = ServiceIdentity::new("echo-01", "127.0.0.1:0");

        let outcome = registry::announce(&registry, &identity).await.unwrap();
        assert_eq!(outcome, AnnounceOutcome::Failed);

        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let body = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.starts_with("GET /health HTTP/1.1\n"));
    }

    #[tokio::test]
    async fn test_required_registry_failure_is_fatal() {
        let unreachable = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let config = Config {
            address: "127.0.0.1:0".to_string(),
            identity: ServiceIdentity::new("echo-01", "127.0.0.1:0"),
            registry: RegistryConfig {
                url: Some(unreachable.to_string()),
                required: true,
                token: None,
                datacenter: None,
            },
            workers: None,
            log_level: "info".to_string(),
        };

        assert!(run(config).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let config = Config {
            address: "not-an-address".to_string(),
            identity: ServiceIdentity::new("echo-01", "not-an-address"),
            registry: RegistryConfig {
                url: None,
                required: false,
                token: None,
                datacenter: None,
            },
            workers: None,
            log_level: "info".to_string(),
        };

        assert!(run(config).await.is_err());
    }
}
