//! Per-kind deploy payloads.
//!
//! Each `DeployKind` has exactly one `DeployData` variant with its own field schema. The payload
//! is serialized to JSON only when it is written to the store; the kind goes into its own column.

use super::args;
use crate::chain::{DeployInfo, RuntimeArgs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification tag stored in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployKind {
    Transfer,
    SimpleTransfer,
    AddBid,
    WithdrawBid,
    Delegate,
    Undelegate,
    Unknown,
    ActivateBid,
    AccountInfo,
    WasmDeploy,
    KeyManagement,
    KeyWeight,
    KeyManagementThreshold,
    CasperSignContract,
    Erc20,
    Faucet,
}

impl DeployKind {
    pub const ALL: [Self; 16] = [
        Self::Transfer,
        Self::SimpleTransfer,
        Self::AddBid,
        Self::WithdrawBid,
        Self::Delegate,
        Self::Undelegate,
        Self::Unknown,
        Self::ActivateBid,
        Self::AccountInfo,
        Self::WasmDeploy,
        Self::KeyManagement,
        Self::KeyWeight,
        Self::KeyManagementThreshold,
        Self::CasperSignContract,
        Self::Erc20,
        Self::Faucet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::SimpleTransfer => "simpleTransfer",
            Self::AddBid => "addBid",
            Self::WithdrawBid => "withdrawBid",
            Self::Delegate => "delegate",
            Self::Undelegate => "undelegate",
            Self::Unknown => "unknown",
            Self::ActivateBid => "activateBid",
            Self::AccountInfo => "accountInfo",
            Self::WasmDeploy => "wasmDeploy",
            Self::KeyManagement => "keyManagement",
            Self::KeyWeight => "keyWeight",
            Self::KeyManagementThreshold => "keyManagementThreshold",
            Self::CasperSignContract => "casperSignContract",
            Self::Erc20 => "ERC20",
            Self::Faucet => "faucet",
        }
    }
}

impl fmt::Display for DeployKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| eyre::eyre!("unknown deploy type tag {s:?}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationData {
    pub delegator: String,
    pub validator: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBidData {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub amount: String,
    pub delegation_rate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawBidData {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateBidData {
    pub validator_public_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManagementData {
    pub action: String,
    // Argument name as deployed on chain.
    pub deployment_thereshold: String,
    pub key_management_threshold: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWeightData {
    pub action: String,
    pub account: String,
    pub weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManagementThresholdData {
    pub action: String,
    pub weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleTransferData {
    pub amount: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Data {
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimals: String,
    pub token_total_supply: String,
    pub authorized_minter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoData {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetData {
    pub target: String,
    pub amount: String,
}

/// Native transfer; `id` is the optional memo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferData {
    pub hash: String,
    pub amount: String,
    pub from: String,
    pub target: String,
    pub id: String,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyData {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeployData {
    Transfer(TransferData),
    SimpleTransfer(SimpleTransferData),
    AddBid(AddBidData),
    WithdrawBid(WithdrawBidData),
    Delegate(DelegationData),
    Undelegate(DelegationData),
    Unknown(EmptyData),
    ActivateBid(ActivateBidData),
    AccountInfo(AccountInfoData),
    WasmDeploy(EmptyData),
    KeyManagement(KeyManagementData),
    KeyWeight(KeyWeightData),
    KeyManagementThreshold(KeyManagementThresholdData),
    CasperSignContract(EmptyData),
    Erc20(Erc20Data),
    Faucet(FaucetData),
}

impl DeployData {
    pub fn kind(&self) -> DeployKind {
        match self {
            Self::Transfer(_) => DeployKind::Transfer,
            Self::SimpleTransfer(_) => DeployKind::SimpleTransfer,
            Self::AddBid(_) => DeployKind::AddBid,
            Self::WithdrawBid(_) => DeployKind::WithdrawBid,
            Self::Delegate(_) => DeployKind::Delegate,
            Self::Undelegate(_) => DeployKind::Undelegate,
            Self::Unknown(_) => DeployKind::Unknown,
            Self::ActivateBid(_) => DeployKind::ActivateBid,
            Self::AccountInfo(_) => DeployKind::AccountInfo,
            Self::WasmDeploy(_) => DeployKind::WasmDeploy,
            Self::KeyManagement(_) => DeployKind::KeyManagement,
            Self::KeyWeight(_) => DeployKind::KeyWeight,
            Self::KeyManagementThreshold(_) => DeployKind::KeyManagementThreshold,
            Self::CasperSignContract(_) => DeployKind::CasperSignContract,
            Self::Erc20(_) => DeployKind::Erc20,
            Self::Faucet(_) => DeployKind::Faucet,
        }
    }

    /// Pulls the named arguments for `kind` out of a session.
    ///
    /// `Transfer` payloads need the whole deploy and come from [`DeployData::transfer`]; asking
    /// for one here yields `Unknown`.
    pub fn from_args(kind: DeployKind, args: &RuntimeArgs) -> Self {
        match kind {
            DeployKind::Delegate => Self::Delegate(delegation(args)),
            DeployKind::Undelegate => Self::Undelegate(delegation(args)),
            DeployKind::AddBid => Self::AddBid(AddBidData {
                public_key: args::public_key(args, "public_key"),
                amount: args::string(args, "amount"),
                delegation_rate: args::string(args, "delegation_rate"),
            }),
            DeployKind::WithdrawBid => Self::WithdrawBid(WithdrawBidData {
                public_key: args::public_key(args, "public_key"),
                amount: args::string(args, "amount"),
            }),
            DeployKind::ActivateBid => Self::ActivateBid(ActivateBidData {
                validator_public_key: args::public_key(args, "validator_public_key"),
            }),
            DeployKind::KeyManagement => Self::KeyManagement(KeyManagementData {
                action: args::string(args, "action"),
                deployment_thereshold: args::string(args, "deployment_thereshold"),
                key_management_threshold: args::string(args, "key_management_threshold"),
            }),
            DeployKind::KeyWeight => Self::KeyWeight(KeyWeightData {
                action: args::string(args, "action"),
                account: args::account_hash(args, "account"),
                weight: args::string(args, "weight"),
            }),
            DeployKind::KeyManagementThreshold => {
                Self::KeyManagementThreshold(KeyManagementThresholdData {
                    action: args::string(args, "action"),
                    weight: args::string(args, "weight"),
                })
            }
            DeployKind::SimpleTransfer => Self::SimpleTransfer(SimpleTransferData {
                amount: args::string(args, "amount"),
                target: args::account_hash(args, "target"),
            }),
            DeployKind::Erc20 => Self::Erc20(Erc20Data {
                token_name: args::string(args, "token_name"),
                token_symbol: args::string(args, "token_symbol"),
                token_decimals: args::string(args, "token_decimals"),
                token_total_supply: args::string(args, "token_total_supply"),
                authorized_minter: args::string(args, "authorized_minter"),
            }),
            DeployKind::AccountInfo => Self::AccountInfo(AccountInfoData {
                url: args::string(args, "url"),
            }),
            DeployKind::Faucet => Self::Faucet(FaucetData {
                target: args::account_hash(args, "target"),
                amount: args::string(args, "amount"),
            }),
            DeployKind::WasmDeploy => Self::WasmDeploy(EmptyData {}),
            DeployKind::CasperSignContract => Self::CasperSignContract(EmptyData {}),
            DeployKind::Transfer | DeployKind::Unknown => Self::Unknown(EmptyData {}),
        }
    }

    pub fn transfer(info: &DeployInfo) -> Self {
        let args = info.deploy.session.args();
        Self::Transfer(TransferData {
            hash: info.deploy.hash.clone(),
            amount: args::string(args, "amount"),
            from: info.deploy.header.account.clone(),
            target: args::account_hash(args, "target"),
            id: args::string(args, "id"),
        })
    }

    pub fn to_json(&self) -> eyre::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuilds a payload from the stored `type` tag and `data` column.
    #[cfg(test)]
    pub fn from_stored(kind: DeployKind, json: &str) -> eyre::Result<Self> {
        let data = match kind {
            DeployKind::Transfer => Self::Transfer(serde_json::from_str(json)?),
            DeployKind::SimpleTransfer => Self::SimpleTransfer(serde_json::from_str(json)?),
            DeployKind::AddBid => Self::AddBid(serde_json::from_str(json)?),
            DeployKind::WithdrawBid => Self::WithdrawBid(serde_json::from_str(json)?),
            DeployKind::Delegate => Self::Delegate(serde_json::from_str(json)?),
            DeployKind::Undelegate => Self::Undelegate(serde_json::from_str(json)?),
            DeployKind::Unknown => Self::Unknown(serde_json::from_str(json)?),
            DeployKind::ActivateBid => Self::ActivateBid(serde_json::from_str(json)?),
            DeployKind::AccountInfo => Self::AccountInfo(serde_json::from_str(json)?),
            DeployKind::WasmDeploy => Self::WasmDeploy(serde_json::from_str(json)?),
            DeployKind::KeyManagement => Self::KeyManagement(serde_json::from_str(json)?),
            DeployKind::KeyWeight => Self::KeyWeight(serde_json::from_str(json)?),
            DeployKind::KeyManagementThreshold => {
                Self::KeyManagementThreshold(serde_json::from_str(json)?)
            }
            DeployKind::CasperSignContract => {
                Self::CasperSignContract(serde_json::from_str(json)?)
            }
            DeployKind::Erc20 => Self::Erc20(serde_json::from_str(json)?),
            DeployKind::Faucet => Self::Faucet(serde_json::from_str(json)?),
        };
        Ok(data)
    }
}

fn delegation(args: &RuntimeArgs) -> DelegationData {
    DelegationData {
        delegator: args::public_key(args, "delegator"),
        validator: args::public_key(args, "validator"),
        amount: args::string(args, "amount"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_parse_back() {
        for kind in DeployKind::ALL {
            assert_eq!(kind.as_str().parse::<DeployKind>().expect("tag"), kind);
        }
        assert!("bogus".parse::<DeployKind>().is_err());
    }

    #[test]
    fn payload_json_uses_stored_field_names() {
        let data = DeployData::AddBid(AddBidData {
            public_key: "01aa".to_string(),
            amount: "10".to_string(),
            delegation_rate: "5".to_string(),
        });
        let json = data.to_json().expect("json");
        assert_eq!(json, r#"{"publicKey":"01aa","amount":"10","delegation_rate":"5"}"#);
        assert_eq!(DeployData::WasmDeploy(EmptyData {}).to_json().expect("json"), "{}");

        let back = DeployData::from_stored(DeployKind::AddBid, &json).expect("from stored");
        assert_eq!(back, data);
    }

    #[test]
    fn empty_payload_kinds_stay_distinct() {
        let unknown = DeployData::from_stored(DeployKind::Unknown, "{}").expect("unknown");
        let sign = DeployData::from_stored(DeployKind::CasperSignContract, "{}").expect("sign");
        assert_eq!(unknown.kind(), DeployKind::Unknown);
        assert_eq!(sign.kind(), DeployKind::CasperSignContract);
    }
}
