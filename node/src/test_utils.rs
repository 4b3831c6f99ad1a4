use crate::chain::{
    BlockBody, BlockHeader, CLValue, ChainBlock, ChainClient, Deploy, DeployHeader, DeployInfo,
    ExecutionResult, ExecutionResultEntry, FetchError, RuntimeArgs, Session,
};
use crate::storage::{BlockRow, DeployRow, Store};
use crate::sync::{RetryPolicy, SyncConfig};
use async_trait::async_trait;
use eyre::{eyre, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use std::time::Duration;

pub const TIMESTAMP: &str = "2021-06-16T21:02:33.472Z";

pub fn block_hash(height: u64) -> String {
    format!("block-{height}")
}

pub fn chain_block(
    height: u64,
    deploy_hashes: Vec<String>,
    transfer_hashes: Vec<String>,
) -> ChainBlock {
    ChainBlock {
        hash: block_hash(height),
        header: BlockHeader {
            era_id: height / 10,
            height,
            timestamp: TIMESTAMP.to_string(),
            era_end: None,
        },
        body: BlockBody {
            deploy_hashes,
            transfer_hashes,
        },
    }
}

pub fn block_row(height: u64, validated: bool) -> BlockRow {
    BlockRow::from_chain(&chain_block(height, Vec::new(), Vec::new()), validated)
}

pub fn cl_value(cl_type: Value, parsed: Value) -> CLValue {
    CLValue {
        cl_type,
        bytes: String::new(),
        parsed,
    }
}

fn named(args: Vec<(&str, CLValue)>) -> RuntimeArgs {
    RuntimeArgs::new(
        args.into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

/// Module-bytes session carrying the given argument names.
pub fn module_bytes_session(names: &[&str]) -> Session {
    Session::ModuleBytes {
        module_bytes: String::new(),
        args: named(
            names
                .iter()
                .map(|name| (*name, cl_value(json!("String"), json!("value"))))
                .collect(),
        ),
    }
}

/// Stored-contract session; by name when `name` is set, by hash otherwise.
pub fn stored_session(entry_point: &str, name: Option<&str>) -> Session {
    let args = named(vec![
        (
            "target",
            cl_value(json!({"ByteArray": 32}), json!("account-hash-00ff")),
        ),
        ("amount", cl_value(json!("U512"), json!("1000"))),
    ]);
    match name {
        Some(name) => Session::StoredContractByName {
            name: name.to_string(),
            entry_point: entry_point.to_string(),
            args,
        },
        None => Session::StoredContractByHash {
            hash: "hash-0102".to_string(),
            entry_point: entry_point.to_string(),
            args,
        },
    }
}

pub fn deploy_info(hash: &str, session: Session, cost: &str) -> DeployInfo {
    DeployInfo {
        deploy: Deploy {
            hash: hash.to_string(),
            header: DeployHeader {
                account: "01aa".to_string(),
                timestamp: TIMESTAMP.to_string(),
            },
            session,
        },
        execution_results: vec![ExecutionResultEntry {
            block_hash: None,
            result: ExecutionResult::Success {
                cost: cost.to_string(),
            },
        }],
    }
}

pub fn module_bytes_deploy(hash: &str, names: &[&str]) -> DeployInfo {
    deploy_info(hash, module_bytes_session(names), "100000000")
}

pub fn transfer_deploy(hash: &str) -> DeployInfo {
    let session = Session::Transfer {
        args: named(vec![
            ("amount", cl_value(json!("U512"), json!("1000"))),
            (
                "target",
                cl_value(json!({"ByteArray": 32}), json!("account-hash-00ff")),
            ),
            ("id", cl_value(json!({"Option": "U64"}), json!(7))),
        ]),
    };
    deploy_info(hash, session, "10000")
}

/// Small batches and short deadlines so paused-time tests stay quick.
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        limit_bulk_insert: 4,
        base_random_throttle_number: 1,
        request_timeout: Duration::from_secs(1),
        retry: RetryPolicy::default(),
    }
}

/// In-memory chain with call counters and injectable failures.
#[derive(Debug, Default)]
pub struct FixtureChain {
    blocks: Mutex<BTreeMap<u64, ChainBlock>>,
    deploys: Mutex<HashMap<String, DeployInfo>>,
    stalled_heights: Mutex<HashSet<u64>>,
    failing_heights: Mutex<HashSet<u64>>,
    stalled_deploys: Mutex<HashSet<String>>,
    height_calls: Mutex<HashMap<u64, usize>>,
    deploy_calls: Mutex<HashMap<String, usize>>,
    deploy_order: Mutex<Vec<String>>,
}

impl FixtureChain {
    pub fn with_empty_blocks(heights: RangeInclusive<u64>) -> Self {
        let chain = Self::default();
        for height in heights {
            chain.add_block(chain_block(height, Vec::new(), Vec::new()));
        }
        chain
    }

    pub fn add_block(&self, block: ChainBlock) {
        self.blocks.lock().insert(block.height(), block);
    }

    pub fn add_deploy(&self, info: DeployInfo) {
        self.deploys.lock().insert(info.deploy.hash.clone(), info);
    }

    pub fn block(&self, height: u64) -> ChainBlock {
        self.blocks
            .lock()
            .get(&height)
            .cloned()
            .expect("fixture block")
    }

    /// Requests for this height never answer.
    pub fn stall_height(&self, height: u64) {
        self.stalled_heights.lock().insert(height);
    }

    /// Requests for this height fail with `NotFound`; lookups by hash still succeed.
    pub fn fail_height(&self, height: u64) {
        self.failing_heights.lock().insert(height);
    }

    pub fn stall_deploy(&self, hash: &str) {
        self.stalled_deploys.lock().insert(hash.to_string());
    }

    pub fn height_calls(&self, height: u64) -> usize {
        self.height_calls.lock().get(&height).copied().unwrap_or(0)
    }

    pub fn deploy_calls(&self, hash: &str) -> usize {
        self.deploy_calls.lock().get(hash).copied().unwrap_or(0)
    }

    /// Deploy hashes in the order they were first requested.
    pub fn deploy_order(&self) -> Vec<String> {
        self.deploy_order.lock().clone()
    }

    pub fn total_deploy_calls(&self) -> usize {
        self.deploy_calls.lock().values().sum()
    }
}

#[async_trait]
impl ChainClient for FixtureChain {
    async fn block_by_height(&self, height: u64) -> Result<ChainBlock, FetchError> {
        *self.height_calls.lock().entry(height).or_default() += 1;
        let stalled = self.stalled_heights.lock().contains(&height);
        if stalled {
            return std::future::pending().await;
        }
        if self.failing_heights.lock().contains(&height) {
            return Err(FetchError::NotFound(format!("block at height {height}")));
        }
        self.blocks
            .lock()
            .get(&height)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("block at height {height}")))
    }

    async fn block_by_hash(&self, hash: &str) -> Result<ChainBlock, FetchError> {
        self.blocks
            .lock()
            .values()
            .find(|block| block.hash == hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("block {hash}")))
    }

    async fn latest_block(&self) -> Result<ChainBlock, FetchError> {
        self.blocks
            .lock()
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| FetchError::NotFound("latest block".to_string()))
    }

    async fn deploy(&self, hash: &str) -> Result<DeployInfo, FetchError> {
        let first_call = {
            let mut calls = self.deploy_calls.lock();
            let count = calls.entry(hash.to_string()).or_default();
            *count += 1;
            *count == 1
        };
        if first_call {
            self.deploy_order.lock().push(hash.to_string());
        }
        let stalled = self.stalled_deploys.lock().contains(hash);
        if stalled {
            return std::future::pending().await;
        }
        self.deploys
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("deploy {hash}")))
    }
}

/// Store whose writes always fail; reads see an empty database.
#[derive(Debug, Default)]
pub struct FailingStore;

impl Store for FailingStore {
    fn upsert_blocks(&self, _rows: &[BlockRow]) -> Result<()> {
        Err(eyre!("store unavailable"))
    }

    fn upsert_deploys(&self, _rows: &[DeployRow]) -> Result<()> {
        Err(eyre!("store unavailable"))
    }

    fn count_deploys_by_hashes(&self, _hashes: &[String]) -> Result<usize> {
        Ok(0)
    }

    fn existing_deploy_hashes(&self, _hashes: &[String]) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    fn find_block_by_height(&self, _height: u64) -> Result<Option<BlockRow>> {
        Ok(None)
    }

    fn find_unvalidated_blocks(&self) -> Result<Vec<BlockRow>> {
        Ok(Vec::new())
    }

    fn find_max_height_block(&self) -> Result<Option<BlockRow>> {
        Ok(None)
    }

    fn find_missing_heights(&self) -> Result<Vec<u64>> {
        Ok(Vec::new())
    }
}
