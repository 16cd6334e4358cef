//! Listener setup and the serve loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use strata::ProxyService;
use strata_common::{StrataError, StrataResult};

use crate::api;

/// Where the daemon accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl ListenAddr {
    /// Combine a protocol name and an address.
    ///
    /// Accepts the protocol names `tcp`, `tcp4`, `tcp6` and `unix`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] for unknown protocols or an empty address.
    pub fn parse(proto: &str, addr: &str) -> StrataResult<Self> {
        if addr.is_empty() {
            return Err(StrataError::Config {
                message: format!("empty listen address for {proto}"),
            });
        }

        match proto {
            "tcp" | "tcp4" | "tcp6" => Ok(Self::Tcp(addr.to_string())),
            "unix" => Ok(Self::Unix(PathBuf::from(addr))),
            other => Err(StrataError::Config {
                message: format!("unsupported listen protocol: {other}"),
            }),
        }
    }
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Serve `service` on `listen` until `shutdown` resolves.
///
/// A stale Unix socket file is replaced, and removed again on shutdown.
pub async fn serve<F>(
    service: Arc<ProxyService>,
    listen: &ListenAddr,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = api::app(service);

    match listen {
        ListenAddr::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
            tracing::info!(addr = %listener.local_addr()?, "Proxy listening on tcp");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        ListenAddr::Unix(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if path.exists() {
                tracing::debug!(path = %path.display(), "Removing stale socket");
                std::fs::remove_file(path)?;
            }

            let listener = tokio::net::UnixListener::bind(path)?;
            tracing::info!(path = %path.display(), "Proxy listening on unix socket");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;

            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove socket");
            }
        }
    }

    tracing::info!("Proxy stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_protocols() {
        assert_eq!(
            ListenAddr::parse("tcp", "127.0.0.1:7070").unwrap(),
            ListenAddr::Tcp("127.0.0.1:7070".into())
        );
        assert_eq!(
            ListenAddr::parse("unix", "/run/strata/strata.sock").unwrap(),
            ListenAddr::Unix("/run/strata/strata.sock".into())
        );
        assert!(ListenAddr::parse("udp", "127.0.0.1:1").is_err());
        assert!(ListenAddr::parse("tcp", "").is_err());
    }

    #[test]
    fn display() {
        let addr = ListenAddr::Unix("/run/s.sock".into());
        assert_eq!(addr.to_string(), "unix:///run/s.sock");
    }
}
