//! Settle-all dispatch window.

use super::SyncError;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Spawns work items and waits for all of them at every barrier.
///
/// A failing item never cancels its siblings: `settle` drains the whole set before reporting the
/// first error it saw.
#[derive(Debug)]
pub struct DispatchWindow {
    tasks: JoinSet<Result<(), SyncError>>,
    limit: usize,
    dispatched: usize,
}

impl DispatchWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            limit: limit.max(1),
            dispatched: 0,
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        self.tasks.spawn(task);
        self.dispatched += 1;
    }

    #[cfg(test)]
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// True right after every `limit`-th dispatch.
    pub fn at_barrier(&self) -> bool {
        self.dispatched > 0 && self.dispatched % self.limit == 0
    }

    /// Waits for every in-flight item.
    pub async fn settle(&mut self) -> Result<(), SyncError> {
        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    } else {
                        warn!(error = %err, "additional dispatched item failed");
                    }
                }
                Err(err) => error!(error = %err, "dispatched task panicked"),
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
