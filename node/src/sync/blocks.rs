//! Block crawling, gap fill and re-validation.

use super::{
    throttle, with_timeout, DeploySyncEngine, DispatchWindow, ItemOutcome, PendingDeploys, Phase,
    ProgressHandle, RowAccumulator, SyncConfig, SyncError, SyncOutcome,
};
use crate::{
    chain::{ChainBlock, ChainClient},
    storage::{BlockRow, Store},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Where a block ended up after `parse_and_fetch_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Every deploy and transfer is stored.
    Complete,
    /// Queued for the deploy engine with this many hashes still missing.
    Incomplete { missing: usize },
}

pub struct BlockSyncEngine {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    blocks: RowAccumulator<BlockRow>,
    deploys: Arc<DeploySyncEngine>,
    config: SyncConfig,
    progress: ProgressHandle,
}

impl BlockSyncEngine {
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        deploys: Arc<DeploySyncEngine>,
        config: SyncConfig,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            client,
            store,
            blocks: RowAccumulator::new(),
            deploys,
            config,
            progress,
        }
    }

    #[cfg(test)]
    pub fn deploys(&self) -> &Arc<DeploySyncEngine> {
        &self.deploys
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &RowAccumulator<BlockRow> {
        &self.blocks
    }

    /// Fetches by height, falling back to the hash stored locally for that height.
    pub async fn fetch_block(&self, height: u64) -> Result<ChainBlock, SyncError> {
        let timeout = self.config.request_timeout;
        let err = match with_timeout(timeout, self.client.block_by_height(height)).await {
            Ok(block) => return Ok(block),
            Err(err) => err,
        };
        let Some(local) = self
            .store
            .find_block_by_height(height)
            .map_err(SyncError::Store)?
        else {
            return Err(err.into());
        };
        debug!(height, hash = %local.hash, error = %err, "retrying block by stored hash");
        Ok(with_timeout(timeout, self.client.block_by_hash(&local.hash)).await?)
    }

    /// Records the block as complete or incomplete; incomplete blocks are queued for deploys.
    pub async fn parse_and_fetch_block(
        &self,
        height: u64,
        pre_fetched: Option<ChainBlock>,
    ) -> Result<BlockState, SyncError> {
        let block = match pre_fetched {
            Some(block) => block,
            None => self.fetch_block(height).await?,
        };
        let hashes = block.all_deploy_hashes();
        let stored = if hashes.is_empty() {
            0
        } else {
            self.store
                .count_deploys_by_hashes(&hashes)
                .map_err(SyncError::Store)?
        };

        if stored == hashes.len() {
            self.blocks.insert(BlockRow::from_chain(&block, true));
            return Ok(BlockState::Complete);
        }
        self.blocks.insert(BlockRow::from_chain(&block, false));
        self.deploys
            .push_deploys_to_parse(&block.hash, PendingDeploys::from_block(&block));
        Ok(BlockState::Incomplete {
            missing: hashes.len() - stored,
        })
    }

    /// `parse_and_fetch_block` with bounded retries; an exhausted height is left as a gap.
    pub async fn parse_block(
        &self,
        height: u64,
        pre_fetched: Option<ChainBlock>,
    ) -> Result<ItemOutcome, SyncError> {
        let mut pre_fetched = pre_fetched;
        let mut retry = 0;
        loop {
            match self.parse_and_fetch_block(height, pre_fetched.take()).await {
                Ok(_) => return Ok(ItemOutcome::Done),
                Err(SyncError::Fetch(err)) if self.config.retry.allows(retry) => {
                    retry += 1;
                    debug!(height, retry, error = %err, "block fetch failed, retrying");
                    tokio::time::sleep(self.config.retry.backoff()).await;
                }
                Err(SyncError::Fetch(err)) => {
                    warn!(height, attempts = retry + 1, error = %err, "giving up on block");
                    return Ok(ItemOutcome::Failed);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Crawls `start..=end`.
    pub async fn parse_interval(self: &Arc<Self>, start: u64, end: u64) -> Result<(), SyncError> {
        let total = if end >= start { end - start + 1 } else { 0 };
        self.crawl(start..=end, total).await
    }

    /// Crawls an explicit list of heights in the given order.
    pub async fn parse_array(self: &Arc<Self>, heights: Vec<u64>) -> Result<(), SyncError> {
        let total = heights.len() as u64;
        self.crawl(heights, total).await
    }

    async fn crawl<I>(self: &Arc<Self>, heights: I, total: u64) -> Result<(), SyncError>
    where
        I: IntoIterator<Item = u64>,
    {
        self.progress.started(Phase::Blocks, total);
        let mut window = DispatchWindow::new(self.config.limit_bulk_insert);
        for height in heights {
            throttle(self.config.base_random_throttle_number).await;
            let engine = Arc::clone(self);
            window.spawn(async move {
                let outcome = engine.parse_block(height, None).await?;
                engine.progress.advanced(Phase::Blocks, outcome);
                Ok(())
            });
            if window.at_barrier() {
                window.settle().await?;
                self.flush_blocks()?;
            }
        }
        window.settle().await?;
        self.flush_blocks()?;
        self.progress.finished(Phase::Blocks);

        self.deploys.parse_all_deploys().await
    }

    /// Heights missing between the lowest and highest stored block.
    pub fn find_missing_block(&self) -> Result<Vec<u64>, SyncError> {
        self.store.find_missing_heights().map_err(SyncError::Store)
    }

    /// Re-checks a stored incomplete block against the chain.
    ///
    /// Returns `None` when the block could not be fetched within the retry budget; it stays
    /// unvalidated until the next pass.
    pub async fn validate_block(&self, row: BlockRow) -> Result<Option<BlockState>, SyncError> {
        let mut retry = 0;
        let block = loop {
            match self.fetch_block(row.height).await {
                Ok(block) => break block,
                Err(SyncError::Fetch(err)) if self.config.retry.allows(retry) => {
                    retry += 1;
                    debug!(
                        height = row.height,
                        retry,
                        error = %err,
                        "validation fetch failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff()).await;
                }
                Err(SyncError::Fetch(err)) => {
                    warn!(
                        height = row.height,
                        hash = %row.hash,
                        attempts = retry + 1,
                        error = %err,
                        "giving up on block validation"
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        };

        let hashes = block.all_deploy_hashes();
        let stored = if hashes.is_empty() {
            0
        } else {
            self.store
                .count_deploys_by_hashes(&hashes)
                .map_err(SyncError::Store)?
        };
        if stored == hashes.len() {
            self.blocks.insert(BlockRow {
                validated: true,
                ..row
            });
            return Ok(Some(BlockState::Complete));
        }
        info!(
            height = row.height,
            missing = hashes.len() - stored,
            total = hashes.len(),
            "block still missing deploys"
        );
        self.parse_and_fetch_block(row.height, Some(block))
            .await
            .map(Some)
    }

    /// Re-validates every stored incomplete block; returns how many became complete.
    pub async fn validate_blocks(self: &Arc<Self>) -> Result<usize, SyncError> {
        let rows = self
            .store
            .find_unvalidated_blocks()
            .map_err(SyncError::Store)?;
        if rows.is_empty() {
            return Ok(0);
        }
        info!(blocks = rows.len(), "validating incomplete blocks");
        self.progress.started(Phase::Validation, rows.len() as u64);

        let validated = Arc::new(AtomicUsize::new(0));
        let mut window = DispatchWindow::new(self.config.limit_bulk_insert);
        for row in rows {
            let engine = Arc::clone(self);
            let validated = Arc::clone(&validated);
            window.spawn(async move {
                let outcome = match engine.validate_block(row).await? {
                    Some(BlockState::Complete) => {
                        validated.fetch_add(1, Ordering::Relaxed);
                        ItemOutcome::Done
                    }
                    Some(BlockState::Incomplete { .. }) => ItemOutcome::Done,
                    None => ItemOutcome::Failed,
                };
                engine.progress.advanced(Phase::Validation, outcome);
                Ok(())
            });
            if window.at_barrier() {
                window.settle().await?;
                self.flush_blocks()?;
                self.deploys.parse_all_deploys().await?;
            }
            throttle(self.config.base_random_throttle_number).await;
        }
        window.settle().await?;
        self.flush_blocks()?;
        self.deploys.parse_all_deploys().await?;
        self.progress.finished(Phase::Validation);

        Ok(validated.load(Ordering::Relaxed))
    }

    /// One full cycle: gap fill, crawl to head, validation.
    pub async fn parse_all_blocks(self: &Arc<Self>) -> Result<SyncOutcome, SyncError> {
        let mut outcome = SyncOutcome::default();

        let missing = self.find_missing_block()?;
        if !missing.is_empty() {
            info!(count = missing.len(), "backfilling missing heights");
            outcome.backfilled = missing.len();
            self.parse_array(missing).await?;
        }

        let head = with_timeout(self.config.request_timeout, self.client.latest_block())
            .await?
            .height();
        let local_max = self
            .store
            .find_max_height_block()
            .map_err(SyncError::Store)?
            .map(|row| row.height);
        outcome.head = head;
        outcome.start = local_max.unwrap_or(0);

        if local_max.is_some_and(|max| max >= head) {
            info!(head, "all blocks parsed");
            outcome.up_to_date = true;
            return Ok(outcome);
        }

        info!(
            start = outcome.start,
            end = head,
            blocks = head - outcome.start,
            "crawling to chain head"
        );
        self.parse_interval(outcome.start, head).await?;
        outcome.validated = self.validate_blocks().await?;
        Ok(outcome)
    }

    fn flush_blocks(&self) -> Result<usize, SyncError> {
        self.blocks
            .flush(self.store.as_ref())
            .map_err(SyncError::Store)
    }
}
