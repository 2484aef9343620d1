//! Periodic index refresh
//!
//! Background thread that asks the store for changes every interval and
//! rebuilds the index when there are any.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::error::Result;
use crate::filter::RebuildOutcome;
use crate::resolver::Resolver;
use crate::store::Store;

/// Handle to the refresh thread; stops it on drop
pub struct IndexRefresher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IndexRefresher {
    /// Start refreshing `resolver` every `interval`
    pub fn spawn<S>(resolver: Arc<Resolver<S>>, interval: Duration) -> Result<Self>
    where
        S: Store + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("index-refresher".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "Index refresher started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => Self::tick(&resolver),
                        // Stop requested or handle dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Index refresher stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn tick<S: Store>(resolver: &Resolver<S>) {
        match resolver.refresh_index() {
            Ok(None) => tracing::trace!("Store unchanged; index kept"),
            Ok(Some(RebuildOutcome::Rebuilt(report))) => tracing::info!(
                generation = report.generation,
                keys = report.keys_inserted,
                "Index refreshed"
            ),
            Ok(Some(RebuildOutcome::AlreadyInProgress)) => {
                tracing::debug!("Refresh skipped; a rebuild is already running")
            }
            Err(e) => tracing::warn!(error = %e, "Index refresh failed"),
        }
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Index refresher thread panicked");
            }
        }
    }
}

impl Drop for IndexRefresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
