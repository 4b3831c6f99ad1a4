//! Deploy queue drain: fetch, classify and buffer every deploy of incomplete blocks.

use super::{
    throttle, with_timeout, DispatchWindow, ItemOutcome, Phase, ProgressHandle, RowAccumulator,
    SyncConfig, SyncError,
};
use crate::{
    chain::{ChainBlock, ChainClient, DeployInfo},
    classify::{classify, classify_transfer, DeployData, DeployKind},
    storage::{DeployRow, Store},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};

/// Hashes of one block still to be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDeploys {
    pub deploy_hashes: Vec<String>,
    pub transfer_hashes: Vec<String>,
}

impl PendingDeploys {
    pub fn from_block(block: &ChainBlock) -> Self {
        Self {
            deploy_hashes: block.body.deploy_hashes.clone(),
            transfer_hashes: block.body.transfer_hashes.clone(),
        }
    }
}

/// Queue entries keep the position of their first insertion.
#[derive(Debug, Default)]
struct PendingQueue {
    next_seq: u64,
    entries: HashMap<String, (u64, PendingDeploys)>,
}

impl PendingQueue {
    fn push(&mut self, block_hash: &str, pending: PendingDeploys) {
        match self.entries.get_mut(block_hash) {
            Some(entry) => entry.1 = pending,
            None => {
                self.entries
                    .insert(block_hash.to_string(), (self.next_seq, pending));
                self.next_seq += 1;
            }
        }
    }

    fn take_ordered(&mut self) -> Vec<(String, PendingDeploys)> {
        let mut entries: Vec<_> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(hash, (seq, pending))| (seq, hash, pending))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, hash, pending)| (hash, pending))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeployTask {
    Deploy,
    Transfer,
}

pub struct DeploySyncEngine {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    deploys: RowAccumulator<DeployRow>,
    pending: Mutex<PendingQueue>,
    config: SyncConfig,
    progress: ProgressHandle,
}

impl DeploySyncEngine {
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        config: SyncConfig,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            client,
            store,
            deploys: RowAccumulator::new(),
            pending: Mutex::new(PendingQueue::default()),
            config,
            progress,
        }
    }

    /// Inserts or overwrites the queue entry for `block_hash`.
    pub fn push_deploys_to_parse(&self, block_hash: &str, pending: PendingDeploys) {
        self.pending.lock().push(block_hash, pending);
    }

    #[cfg(test)]
    pub fn pending_blocks(&self) -> usize {
        self.pending.lock().entries.len()
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &RowAccumulator<DeployRow> {
        &self.deploys
    }

    /// Fetches, classifies and buffers one deploy.
    pub async fn parse_deploy(&self, hash: &str, block_hash: &str) -> ItemOutcome {
        let Some(info) = self.fetch_deploy(hash, block_hash).await else {
            return ItemOutcome::Failed;
        };
        let cost = match info.execution() {
            Ok(execution) => execution.cost().to_string(),
            Err(err) => {
                warn!(hash, block_hash, error = %err, "dropping deploy");
                return ItemOutcome::Failed;
            }
        };
        let data = classify(&info.deploy.session, &cost);
        if data.kind() == DeployKind::Unknown {
            info!(
                hash,
                block_hash,
                entry_point = info.deploy.session.entry_point().unwrap_or_default(),
                "unclassified deploy"
            );
        }
        self.record(&info, block_hash, data)
    }

    /// Fetches and buffers one native transfer.
    pub async fn store_transfer(&self, hash: &str, block_hash: &str) -> ItemOutcome {
        let Some(info) = self.fetch_deploy(hash, block_hash).await else {
            return ItemOutcome::Failed;
        };
        let data = classify_transfer(&info);
        self.record(&info, block_hash, data)
    }

    fn record(&self, info: &DeployInfo, block_hash: &str, data: DeployData) -> ItemOutcome {
        match DeployRow::from_chain(info, block_hash, data) {
            Ok(row) => {
                self.deploys.insert(row);
                ItemOutcome::Done
            }
            Err(err) => {
                warn!(hash = info.hash(), block_hash, error = %err, "dropping deploy");
                ItemOutcome::Failed
            }
        }
    }

    /// Retries timeouts only; any other failure drops the deploy.
    async fn fetch_deploy(&self, hash: &str, block_hash: &str) -> Option<DeployInfo> {
        let mut retry = 0;
        loop {
            match with_timeout(self.config.request_timeout, self.client.deploy(hash)).await {
                Ok(info) => return Some(info),
                Err(err) if err.is_timeout() && self.config.retry.allows(retry) => {
                    retry += 1;
                    debug!(hash, block_hash, retry, "deploy fetch timed out, retrying");
                    tokio::time::sleep(self.config.retry.backoff()).await;
                }
                Err(err) => {
                    warn!(
                        hash,
                        block_hash,
                        attempts = retry + 1,
                        error = %err,
                        "giving up on deploy"
                    );
                    return None;
                }
            }
        }
    }

    /// Drains the whole queue, flushing the deploy buffer at every barrier and at the end.
    pub async fn parse_all_deploys(self: &Arc<Self>) -> Result<(), SyncError> {
        let queue = self.pending.lock().take_ordered();
        if queue.is_empty() {
            return Ok(());
        }

        // Every queued deploy goes out before any transfer.
        let mut deploys = Vec::new();
        let mut transfers = Vec::new();
        for (block_hash, pending) in queue {
            let all: Vec<String> = pending
                .deploy_hashes
                .iter()
                .chain(pending.transfer_hashes.iter())
                .cloned()
                .collect();
            let stored = self
                .store
                .existing_deploy_hashes(&all)
                .map_err(SyncError::Store)?;
            for hash in pending.deploy_hashes {
                if !stored.contains(&hash) {
                    deploys.push((hash, block_hash.clone(), DeployTask::Deploy));
                }
            }
            for hash in pending.transfer_hashes {
                if !stored.contains(&hash) {
                    transfers.push((hash, block_hash.clone(), DeployTask::Transfer));
                }
            }
        }
        let mut work = deploys;
        work.extend(transfers);

        info!(deploys = work.len(), "parsing deploys");
        self.progress.started(Phase::Deploys, work.len() as u64);
        let mut window = DispatchWindow::new(self.config.limit_bulk_insert);
        for (hash, block_hash, task) in work {
            throttle(self.config.base_random_throttle_number).await;
            let engine = Arc::clone(self);
            window.spawn(async move {
                let outcome = match task {
                    DeployTask::Deploy => engine.parse_deploy(&hash, &block_hash).await,
                    DeployTask::Transfer => engine.store_transfer(&hash, &block_hash).await,
                };
                engine.progress.advanced(Phase::Deploys, outcome);
                Ok(())
            });
            if window.at_barrier() {
                window.settle().await?;
                self.flush()?;
            }
        }
        window.settle().await?;
        self.flush()?;
        self.progress.finished(Phase::Deploys);
        Ok(())
    }

    pub fn flush(&self) -> Result<usize, SyncError> {
        self.deploys
            .flush(self.store.as_ref())
            .map_err(SyncError::Store)
    }
}
