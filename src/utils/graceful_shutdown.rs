use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::{signal, sync::watch};

/// Why the server is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// The shutdown channel closed before any signal arrived
    ChannelClosed,
}

/// Fans a single stop signal out to every waiter.
///
/// The first reason wins; later signals are logged and ignored. Waiters that
/// subscribe after the signal still see it.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(None);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    /// Wait for SIGINT or SIGTERM and record the matching reason.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        #[cfg(unix)]
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to register SIGTERM handler")?;

        #[cfg(unix)]
        let terminate = sigterm.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            res = signal::ctrl_c() => {
                res.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT, initiating graceful shutdown");
                self.initiate_shutdown(ShutdownReason::Interrupt);
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
                self.initiate_shutdown(ShutdownReason::Terminate);
            }
        }
        Ok(())
    }

    fn initiate_shutdown(&self, reason: ShutdownReason) {
        let first = self.shutdown_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::info!("Processing shutdown: {:?}", reason);
        } else {
            tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Resolve once a shutdown signal has been received.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.shutdown_tx.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::ChannelClosed),
            Err(_) => {
                tracing::warn!("Shutdown channel closed unexpectedly");
                ShutdownReason::ChannelClosed
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_signal_wakes_waiter() {
        let shutdown = GracefulShutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown_signal().await });

        tokio::task::yield_now().await;
        shutdown.initiate_shutdown(ShutdownReason::Terminate);

        let reason = timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::Terminate);
        assert!(shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_first_reason_wins_for_late_waiters() {
        let shutdown = GracefulShutdown::new();
        shutdown.initiate_shutdown(ShutdownReason::Interrupt);
        shutdown.initiate_shutdown(ShutdownReason::Terminate);

        let reason = timeout(Duration::from_millis(100), shutdown.wait_for_shutdown_signal())
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Interrupt);
    }

    #[tokio::test]
    async fn test_no_signal_keeps_waiting() {
        let shutdown = GracefulShutdown::new();
        let waited = timeout(Duration::from_millis(50), shutdown.wait_for_shutdown_signal()).await;
        assert!(waited.is_err());
    }
}
