//! Graceful shutdown coordination for Pulse.
//!
//! [`ShutdownSignal`] flips once, either from an OS signal (Ctrl+C, SIGTERM)
//! or from [`ShutdownSignal::trigger`]. Clones share the same state, and a
//! waiter that subscribes after the flip still sees it.
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! shutdown.listen_for_os_signals();
//!
//! let waiter = shutdown.clone();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(async move { waiter.wait().await })
//!     .await?;
//! ```

use tokio::sync::watch;
use tracing::{error, info};

/// A one-way shutdown flag shared across tasks.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Create a signal that has not fired yet.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Fire the signal.
    pub fn trigger(&self) {
        if !self.is_shutdown() {
            info!("Shutdown triggered");
        }
        self.sender.send_replace(true);
    }

    /// Returns true once the signal has fired.
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // Only fails if every sender is dropped, and `self` holds one.
        let _ = receiver.wait_for(|fired| *fired).await;
    }

    /// Spawn a task that fires the signal on Ctrl+C or SIGTERM.
    pub fn listen_for_os_signals(&self) {
        let signal = self.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
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
                _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
                _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
            }

            signal.trigger();
        });
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_signal_has_not_fired() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());

        let result = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let signal = ShutdownSignal::new();

        let trigger_signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger_signal.trigger();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), signal.wait()).await;
        assert!(result.is_ok());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_waiter_sees_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let clone = signal.clone();
        let result = tokio::time::timeout(Duration::from_millis(100), clone.wait()).await;
        assert!(result.is_ok());
    }
}
