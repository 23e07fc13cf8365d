//! Wall-clock runaway protection for simulation runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::warn;

use crate::simulator::StopHandle;

/// Helper to enforce a wall-clock timeout on a simulation run.
///
/// Runs a detached timer thread that fires the simulator's [`StopHandle`]
/// when the budget elapses. This is protection against runaway simulations,
/// not protocol logic; the only shared state is the atomic stop flag.
#[derive(Debug)]
pub struct WallClockTimeout {
    occurred: Arc<AtomicBool>,
    cancel_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WallClockTimeout {
    /// Start the timer. Call [`WallClockTimeout::cancel`] (or drop) after the
    /// run returns.
    pub fn start(limit: Duration, stop: StopHandle) -> Self {
        let occurred = Arc::new(AtomicBool::new(false));
        let occurred_flag = Arc::clone(&occurred);
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(limit) {
                warn!("wall-clock timeout after {limit:?}, stopping simulation");
                occurred_flag.store(true, Ordering::SeqCst);
                stop.stop();
            }
        });

        WallClockTimeout {
            occurred,
            cancel_tx,
            thread: Some(thread),
        }
    }

    /// Whether the timeout fired before being cancelled.
    pub fn occurred(&self) -> bool {
        self.occurred.load(Ordering::SeqCst)
    }

    /// Cancel the timer and join the thread.
    pub fn cancel(mut self) -> bool {
        self.shutdown();
        self.occurred()
    }

    fn shutdown(&mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WallClockTimeout {
    fn drop(&mut self) {
        self.shutdown();
    }
}
