//! Process signals and the watcher shutdown channel
//!
//! The watcher loop stops when its `watch::Receiver<bool>` turns `true`.
//! [`watcher_shutdown`] ties that channel to SIGTERM, SIGINT and Ctrl+C;
//! [`shutdown_when`] ties it to any future.

use std::fmt;
use std::future::{pending, Future};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Signal that ended the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Terminate,
    Interrupt,
    CtrlC,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shutdown::Terminate => "SIGTERM",
            Shutdown::Interrupt => "SIGINT",
            Shutdown::CtrlC => "Ctrl+C",
        })
    }
}

/// Wait until the process is asked to stop
///
/// A handler that cannot be installed is skipped; the remaining ones still
/// count.
pub async fn wait_for_shutdown_signal() -> Shutdown {
    #[cfg(unix)]
    let received = {
        use tokio::signal::unix::{signal, SignalKind};

        async fn next(kind: SignalKind, name: &str) {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Cannot listen for {}: {}", name, e);
                    pending::<()>().await;
                }
            }
        }

        tokio::select! {
            _ = next(SignalKind::terminate(), "SIGTERM") => Shutdown::Terminate,
            _ = next(SignalKind::interrupt(), "SIGINT") => Shutdown::Interrupt,
            _ = ctrl_c() => Shutdown::CtrlC,
        }
    };

    #[cfg(not(unix))]
    let received = {
        ctrl_c().await;
        Shutdown::CtrlC
    };

    info!("Received {}, stopping module watcher", received);
    received
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C: {}", e);
        pending::<()>().await;
    }
}

/// Shutdown channel that flips to `true` once `trigger` completes
///
/// Must be called from within a tokio runtime.
pub fn shutdown_when<F>(trigger: F) -> watch::Receiver<bool>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        trigger.await;
        // Nobody listening any more is fine
        let _ = tx.send(true);
    });
    rx
}

/// Shutdown channel for the module watcher, driven by process signals
pub fn watcher_shutdown() -> watch::Receiver<bool> {
    shutdown_when(async {
        wait_for_shutdown_signal().await;
    })
}
