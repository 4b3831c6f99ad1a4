//! JSON-RPC client for a chain node.

use super::{ChainBlock, ChainClient, DeployInfo, FetchError};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use jsonrpsee::{
    core::{client::ClientT, params::ObjectParams, ClientError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC error code for an unknown deploy.
const NO_SUCH_DEPLOY: i32 = -32000;
/// JSON-RPC error code for an unknown block.
const NO_SUCH_BLOCK: i32 = -32001;

#[derive(Debug, Deserialize)]
struct GetBlockResult {
    block: Option<ChainBlock>,
}

/// `ChainClient` backed by a node's HTTP JSON-RPC endpoint.
#[derive(Debug)]
pub struct RpcChainClient {
    client: HttpClient,
    request_timeout: Duration,
}

impl RpcChainClient {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url)
            .wrap_err_with(|| format!("failed to build RPC client for {url}"))?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    async fn get_block(
        &self,
        identifier: Option<Value>,
        what: String,
    ) -> Result<ChainBlock, FetchError> {
        let result: GetBlockResult = match identifier {
            Some(identifier) => {
                let params = object_params("block_identifier", identifier)?;
                self.client.request("chain_get_block", params).await
            }
            None => self.client.request("chain_get_block", rpc_params![]).await,
        }
        .map_err(|err| self.map_error(err, &what))?;
        result.block.ok_or(FetchError::NotFound(what))
    }

    fn map_error(&self, err: ClientError, what: &str) -> FetchError {
        match err {
            ClientError::RequestTimeout => FetchError::Timeout(self.request_timeout),
            ClientError::Call(err_obj)
                if err_obj.code() == NO_SUCH_BLOCK || err_obj.code() == NO_SUCH_DEPLOY =>
            {
                FetchError::NotFound(what.to_string())
            }
            ClientError::Call(err_obj) => FetchError::Network(format!(
                "{what}: rpc error {}: {}",
                err_obj.code(),
                err_obj.message()
            )),
            ClientError::ParseError(err) => FetchError::Malformed(format!("{what}: {err}")),
            other => FetchError::Network(format!("{what}: {other}")),
        }
    }
}

fn object_params(name: &str, value: Value) -> Result<ObjectParams, FetchError> {
    let mut params = ObjectParams::new();
    params
        .insert(name, value)
        .map_err(|err| FetchError::Malformed(format!("invalid request params: {err}")))?;
    Ok(params)
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_by_height(&self, height: u64) -> Result<ChainBlock, FetchError> {
        self.get_block(Some(json!({ "Height": height })), format!("block at height {height}"))
            .await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<ChainBlock, FetchError> {
        self.get_block(Some(json!({ "Hash": hash })), format!("block {hash}"))
            .await
    }

    async fn latest_block(&self) -> Result<ChainBlock, FetchError> {
        self.get_block(None, "latest block".to_string()).await
    }

    async fn deploy(&self, hash: &str) -> Result<DeployInfo, FetchError> {
        let what = format!("deploy {hash}");
        let params = object_params("deploy_hash", json!(hash))?;
        self.client
            .request("info_get_deploy", params)
            .await
            .map_err(|err| self.map_error(err, &what))
    }
}
