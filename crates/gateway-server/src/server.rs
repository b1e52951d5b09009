//! HTTP server lifecycle.

use gateway_config::ServerSettings;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{routes::create_router, state::AppState};

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// `host:port` that was requested
        addr: String,
        /// Cause
        source: std::io::Error,
    },

    /// The server failed while serving
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Time allowed for in-flight requests after a shutdown signal
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take host, port and shutdown timeout from the `server` section
    #[must_use]
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            shutdown_timeout: settings.shutdown_timeout,
        }
    }

    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the shutdown timeout
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bind a listener, resolving `host` if it is a name
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{}", self.host, self.port),
                source,
            })
    }
}

/// The gateway HTTP server
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until SIGINT/SIGTERM, then drain in-flight requests for at most
    /// the configured shutdown timeout.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.config.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state);
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Gateway listening");
        }

        let (drain_tx, mut drain_rx) = watch::channel(false);
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = drain_rx.changed().await;
                })
                .await
        });

        tokio::select! {
            result = &mut server => return flatten(result),
            () = shutdown => {}
        }

        info!(timeout = ?self.config.shutdown_timeout, "Draining in-flight requests");
        let _ = drain_tx.send(true);

        match tokio::time::timeout(self.config.shutdown_timeout, &mut server).await {
            Ok(result) => {
                info!("Server stopped");
                flatten(result)
            }
            Err(_) => {
                warn!("Shutdown timeout elapsed, aborting remaining connections");
                server.abort();
                Ok(())
            }
        }
    }
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(served) => served.map_err(ServerError::Serve),
        Err(e) => Err(ServerError::Serve(std::io::Error::other(e))),
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
    };
    info!(signal = signal_name, "Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::GatewayConfig;

    #[tokio::test]
    async fn test_bind_resolves_host_names() {
        let listener = ServerConfig::new()
            .with_host("localhost")
            .with_port(0)
            .bind()
            .await
            .expect("bind localhost");
        assert!(listener.local_addr().expect("addr").ip().is_loopback());

        let invalid = ServerConfig::new().with_host("not a host").with_port(0).bind().await;
        assert!(matches!(invalid, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let state = AppState::from_config(GatewayConfig::default()).expect("state");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server = Server::new(
            ServerConfig::new().with_shutdown_timeout(Duration::from_secs(1)),
            state,
        );

        let result = server.serve(listener, async {}).await;
        assert!(result.is_ok());
    }
}
