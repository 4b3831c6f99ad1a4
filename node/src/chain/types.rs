//! Wire shapes returned by the node, trimmed to the fields the indexer reads.

use super::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainBlock {
    pub hash: String,
    pub header: BlockHeader,
    pub body: BlockBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub era_id: u64,
    pub height: u64,
    pub timestamp: String,
    /// Present (non-null) only on the last block of an era.
    #[serde(default)]
    pub era_end: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockBody {
    #[serde(default)]
    pub deploy_hashes: Vec<String>,
    #[serde(default)]
    pub transfer_hashes: Vec<String>,
}

impl ChainBlock {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn is_era_end(&self) -> bool {
        self.header.era_end.as_ref().is_some_and(|value| !value.is_null())
    }

    /// Deploy hashes followed by transfer hashes, duplicates removed.
    pub fn all_deploy_hashes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.body
            .deploy_hashes
            .iter()
            .chain(self.body.transfer_hashes.iter())
            .filter(|hash| seen.insert(hash.as_str()))
            .cloned()
            .collect()
    }
}

/// Result of `info_get_deploy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployInfo {
    pub deploy: Deploy,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResultEntry>,
}

impl DeployInfo {
    pub fn hash(&self) -> &str {
        &self.deploy.hash
    }

    /// The first execution result; deploys that have not executed yet are malformed for us.
    pub fn execution(&self) -> Result<&ExecutionResult, FetchError> {
        self.execution_results
            .first()
            .map(|entry| &entry.result)
            .ok_or_else(|| {
                FetchError::Malformed(format!("deploy {} has no execution result", self.deploy.hash))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub hash: String,
    pub header: DeployHeader,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployHeader {
    pub account: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResultEntry {
    #[serde(default)]
    pub block_hash: Option<String>,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Success {
        cost: String,
    },
    Failure {
        cost: String,
        #[serde(default)]
        error_message: Option<String>,
    },
}

impl ExecutionResult {
    pub fn cost(&self) -> &str {
        match self {
            Self::Success { cost } | Self::Failure { cost, .. } => cost,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Executable session item of a deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Session {
    ModuleBytes {
        #[serde(default)]
        module_bytes: String,
        args: RuntimeArgs,
    },
    StoredContractByHash {
        hash: String,
        entry_point: String,
        args: RuntimeArgs,
    },
    StoredContractByName {
        name: String,
        entry_point: String,
        args: RuntimeArgs,
    },
    StoredVersionedContractByHash {
        hash: String,
        #[serde(default)]
        version: Option<u32>,
        entry_point: String,
        args: RuntimeArgs,
    },
    StoredVersionedContractByName {
        name: String,
        #[serde(default)]
        version: Option<u32>,
        entry_point: String,
        args: RuntimeArgs,
    },
    Transfer {
        args: RuntimeArgs,
    },
}

impl Session {
    pub fn args(&self) -> &RuntimeArgs {
        match self {
            Self::ModuleBytes { args, .. }
            | Self::StoredContractByHash { args, .. }
            | Self::StoredContractByName { args, .. }
            | Self::StoredVersionedContractByHash { args, .. }
            | Self::StoredVersionedContractByName { args, .. }
            | Self::Transfer { args } => args,
        }
    }

    pub fn entry_point(&self) -> Option<&str> {
        match self {
            Self::StoredContractByHash { entry_point, .. }
            | Self::StoredContractByName { entry_point, .. }
            | Self::StoredVersionedContractByHash { entry_point, .. }
            | Self::StoredVersionedContractByName { entry_point, .. } => Some(entry_point),
            Self::ModuleBytes { .. } | Self::Transfer { .. } => None,
        }
    }

    /// Contract name for the by-name variants.
    pub fn contract_name(&self) -> Option<&str> {
        match self {
            Self::StoredContractByName { name, .. }
            | Self::StoredVersionedContractByName { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Named runtime arguments, in the node's `[[name, value], ...]` encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeArgs(Vec<(String, CLValue)>);

impl RuntimeArgs {
    #[cfg(test)]
    pub fn new(args: Vec<(String, CLValue)>) -> Self {
        Self(args)
    }

    pub fn get(&self, name: &str) -> Option<&CLValue> {
        self.0
            .iter()
            .find(|(arg_name, _)| arg_name == name)
            .map(|(_, value)| value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.has(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CLValue {
    pub cl_type: Value,
    #[serde(default)]
    pub bytes: String,
    #[serde(default)]
    pub parsed: Value,
}
