//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT and SIGTERM (Ctrl-C elsewhere)
//! - Hand the first one to the shutdown coordinator
//! - Keep listening afterwards so repeats are logged instead of killing the
//!   process mid-shutdown

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownCoordinator;

/// Registered termination signal streams.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Register the handlers. Must be called from within the runtime.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

/// Forward every later signal to `coordinator`, which logs and ignores it.
pub fn spawn_repeat_listener(
    mut signals: TerminationSignals,
    coordinator: Arc<ShutdownCoordinator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let name = signals.recv().await;
            coordinator.signal(name);
        }
    })
}
