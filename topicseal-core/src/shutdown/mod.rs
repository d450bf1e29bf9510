//! Graceful shutdown coordinator
//!
//! Long-running tasks such as the periodic reconciler run under a
//! [`ShutdownHandler`] and stop when the coordinator fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Shutdown signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Immediate,
}

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// Grace period between signalling and reporting `Shutdown`
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            grace_period,
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every subscriber, then wait out the grace period
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return;
        }
        info!("Initiating graceful shutdown");
        *state = ShutdownState::ShuttingDown;
        drop(state);

        // No receivers is fine: nothing is running.
        let _ = self.shutdown_tx.send(ShutdownSignal::Graceful);

        tokio::time::sleep(self.grace_period).await;

        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    /// Signal every subscriber without a grace period
    pub async fn shutdown_immediately(&self) {
        warn!("Initiating immediate shutdown");
        *self.state.write().await = ShutdownState::Shutdown;
        let _ = self.shutdown_tx.send(ShutdownSignal::Immediate);
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Resolve once shutdown has been requested, including before this call
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down().await {
            return;
        }
        let _ = rx.recv().await;
    }
}

/// Runs one component until it finishes or shutdown is signalled
pub struct ShutdownHandler {
    coordinator: Arc<ShutdownCoordinator>,
    component_name: String,
}

impl ShutdownHandler {
    pub fn new(coordinator: Arc<ShutdownCoordinator>, component_name: impl Into<String>) -> Self {
        Self {
            coordinator,
            component_name: component_name.into(),
        }
    }

    /// Run a component with graceful shutdown support
    pub async fn run<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        info!(component = %self.component_name, "Starting component");

        let mut shutdown_rx = self.coordinator.subscribe();
        if self.coordinator.is_shutting_down().await {
            info!(component = %self.component_name, "Shutdown already requested, not starting");
            return;
        }

        tokio::select! {
            _ = f() => {
                info!(component = %self.component_name, "Component completed normally");
            }
            signal = shutdown_rx.recv() => {
                match signal {
                    Ok(ShutdownSignal::Graceful) => {
                        info!(
                            component = %self.component_name,
                            "Received graceful shutdown signal"
                        );
                    }
                    Ok(ShutdownSignal::Immediate) => {
                        warn!(
                            component = %self.component_name,
                            "Received immediate shutdown signal"
                        );
                    }
                    Err(e) => {
                        error!(
                            component = %self.component_name,
                            error = %e,
                            "Shutdown channel error"
                        );
                    }
                }
            }
        }
    }
}

/// Trigger graceful shutdown on Ctrl-C (and SIGTERM on unix)
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        coordinator.shutdown().await;
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));

        assert_eq!(coordinator.state().await, ShutdownState::Running);
        coordinator.shutdown().await;
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);

        // Late waiters return immediately.
        coordinator.wait_for_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_handler_stops_component() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(10)));
        let handler = ShutdownHandler::new(coordinator.clone(), "test_component");

        let task = tokio::spawn(async move {
            handler
                .run(|| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.shutdown().await;

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_skips_after_shutdown() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::ZERO));
        coordinator.shutdown_immediately().await;

        let handler = ShutdownHandler::new(coordinator, "late");
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        handler.run(|| async move { flag.store(true, Ordering::SeqCst) }).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
