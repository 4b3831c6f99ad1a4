//! Chain data model and the remote node seam.

mod rpc;
mod types;

pub use rpc::RpcChainClient;
pub use types::{ChainBlock, DeployInfo, RuntimeArgs, Session};
#[cfg(test)]
pub use types::{
    BlockBody, BlockHeader, CLValue, Deploy, DeployHeader, ExecutionResult, ExecutionResultEntry,
};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The call did not complete before its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The node does not know the requested block or deploy.
    #[error("{0} not found")]
    NotFound(String),
    /// Transport or server-side failure.
    #[error("network error: {0}")]
    Network(String),
    /// The node answered with something we cannot interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Read access to a chain node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_by_height(&self, height: u64) -> Result<ChainBlock, FetchError>;

    async fn block_by_hash(&self, hash: &str) -> Result<ChainBlock, FetchError>;

    /// Returns the block at the node's current head.
    async fn latest_block(&self) -> Result<ChainBlock, FetchError>;

    async fn deploy(&self, hash: &str) -> Result<DeployInfo, FetchError>;
}
