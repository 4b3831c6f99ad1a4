//! Deploy classification.
//!
//! Module-bytes sessions are classified by the set of argument names they carry, using an ordered
//! rule table that is evaluated in full: every matching rule overwrites the previous result, so
//! the last match wins. Stored-contract sessions dispatch on the entry point (and, for two entry
//! points, on the contract name).

mod args;
mod data;

pub use data::{DeployData, DeployKind};
#[cfg(test)]
pub use data::{DelegationData, EmptyData};

use crate::chain::{DeployInfo, RuntimeArgs, Session};

/// One row of the module-bytes rule table.
struct ModuleBytesRule {
    matches: fn(&RuntimeArgs) -> bool,
    kind: fn(&str) -> DeployKind,
}

/// Evaluated top to bottom; later matches override earlier ones.
const MODULE_BYTES_RULES: &[ModuleBytesRule] = &[
    ModuleBytesRule {
        matches: |args| args.has_all(&["delegator", "validator", "amount"]),
        kind: |cost| {
            if cost_exceeds_one(cost) {
                DeployKind::Delegate
            } else {
                DeployKind::Undelegate
            }
        },
    },
    ModuleBytesRule {
        matches: |args| args.has("delegation_rate"),
        kind: |_| DeployKind::AddBid,
    },
    ModuleBytesRule {
        matches: |args| args.has_all(&["public_key", "amount"]),
        kind: |_| DeployKind::WithdrawBid,
    },
    ModuleBytesRule {
        matches: |args| args.has("validator_public_key") && args.len() == 1,
        kind: |_| DeployKind::ActivateBid,
    },
    ModuleBytesRule {
        matches: |args| {
            args.has_all(&["action", "deployment_thereshold", "key_management_threshold"])
        },
        kind: |_| DeployKind::KeyManagement,
    },
    ModuleBytesRule {
        matches: |args| args.has_all(&["action", "account", "weight"]) && args.len() == 3,
        kind: |_| DeployKind::KeyWeight,
    },
    ModuleBytesRule {
        matches: |args| args.has_all(&["action", "weight"]) && args.len() == 2,
        kind: |_| DeployKind::KeyManagementThreshold,
    },
    ModuleBytesRule {
        matches: |args| args.has_all(&["target", "amount"]) && args.len() == 2,
        kind: |_| DeployKind::SimpleTransfer,
    },
    ModuleBytesRule {
        matches: |args| args.has_all(&["token_name", "token_symbol"]),
        kind: |_| DeployKind::Erc20,
    },
    ModuleBytesRule {
        matches: |args| args.is_empty(),
        kind: |_| DeployKind::WasmDeploy,
    },
];

/// Classifies a deploy session. `cost` is the execution cost as reported by the node.
pub fn classify(session: &Session, cost: &str) -> DeployData {
    let kind = match session {
        Session::ModuleBytes { args, .. } => classify_module_bytes(args, cost),
        Session::Transfer { .. } => DeployKind::Unknown,
        stored => classify_stored_contract(
            stored.entry_point().unwrap_or_default(),
            stored.contract_name(),
        ),
    };
    DeployData::from_args(kind, session.args())
}

/// Transfers are always `Transfer`, whatever their session looks like.
pub fn classify_transfer(info: &DeployInfo) -> DeployData {
    DeployData::transfer(info)
}

pub fn classify_module_bytes(args: &RuntimeArgs, cost: &str) -> DeployKind {
    let mut kind = DeployKind::Unknown;
    for rule in MODULE_BYTES_RULES {
        if (rule.matches)(args) {
            kind = (rule.kind)(cost);
        }
    }
    kind
}

pub fn classify_stored_contract(entry_point: &str, contract_name: Option<&str>) -> DeployKind {
    match (entry_point, contract_name) {
        ("delegate", _) => DeployKind::Delegate,
        ("undelegate", _) => DeployKind::Undelegate,
        ("add_bid", _) => DeployKind::AddBid,
        ("withdraw_bid", _) => DeployKind::WithdrawBid,
        ("set_url", _) => DeployKind::AccountInfo,
        ("store_signature", Some("caspersign_contract")) => DeployKind::CasperSignContract,
        ("call_faucet", Some("faucet")) => DeployKind::Faucet,
        _ => DeployKind::Unknown,
    }
}

fn cost_exceeds_one(cost: &str) -> bool {
    cost.trim().parse::<f64>().is_ok_and(|cost| cost > 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{module_bytes_session, stored_session, transfer_deploy};

    const DEFAULT_COST: &str = "667974020";

    fn module_kind(names: &[&str], cost: &str) -> DeployKind {
        classify(&module_bytes_session(names), cost).kind()
    }

    #[test]
    fn module_bytes_rule_table() {
        let cases: &[(&[&str], &str, DeployKind)] = &[
            (&["delegator", "validator", "amount"], DEFAULT_COST, DeployKind::Delegate),
            (&["delegator", "validator", "amount"], "1", DeployKind::Undelegate),
            (&["delegation_rate"], DEFAULT_COST, DeployKind::AddBid),
            (&["public_key", "amount"], DEFAULT_COST, DeployKind::WithdrawBid),
            (&["validator_public_key"], DEFAULT_COST, DeployKind::ActivateBid),
            (&["validator_public_key", "randomArg"], DEFAULT_COST, DeployKind::Unknown),
            (
                &["action", "deployment_thereshold", "key_management_threshold"],
                DEFAULT_COST,
                DeployKind::KeyManagement,
            ),
            (&["action", "account", "weight"], DEFAULT_COST, DeployKind::KeyWeight),
            (&["action", "account", "weight", "randomArg"], DEFAULT_COST, DeployKind::Unknown),
            (&["action", "weight"], DEFAULT_COST, DeployKind::KeyManagementThreshold),
            (&["action", "weight", "randomArg"], DEFAULT_COST, DeployKind::Unknown),
            (&["target", "amount"], DEFAULT_COST, DeployKind::SimpleTransfer),
            (&["target", "amount", "randomArg"], DEFAULT_COST, DeployKind::Unknown),
            (&["token_name", "token_symbol"], DEFAULT_COST, DeployKind::Erc20),
            (&[], DEFAULT_COST, DeployKind::WasmDeploy),
            (&["randomArg"], DEFAULT_COST, DeployKind::Unknown),
        ];
        for (names, cost, expected) in cases {
            assert_eq!(module_kind(names, cost), *expected, "args {names:?} cost {cost}");
        }
    }

    #[test]
    fn later_rule_overrides_earlier_match() {
        let names = ["delegator", "validator", "amount", "delegation_rate"];
        assert_eq!(module_kind(&names, DEFAULT_COST), DeployKind::AddBid);
        assert_eq!(module_kind(&names, "0"), DeployKind::AddBid);
    }

    #[test]
    fn withdraw_bid_overrides_add_bid() {
        let names = ["public_key", "amount", "delegation_rate"];
        assert_eq!(module_kind(&names, DEFAULT_COST), DeployKind::WithdrawBid);
    }

    #[test]
    fn unparseable_cost_is_undelegate() {
        assert_eq!(
            module_kind(&["delegator", "validator", "amount"], "n/a"),
            DeployKind::Undelegate
        );
    }

    #[test]
    fn stored_contract_dispatch() {
        let cases: &[(&str, Option<&str>, DeployKind)] = &[
            ("delegate", None, DeployKind::Delegate),
            ("undelegate", None, DeployKind::Undelegate),
            ("add_bid", None, DeployKind::AddBid),
            ("withdraw_bid", None, DeployKind::WithdrawBid),
            ("set_url", None, DeployKind::AccountInfo),
            ("store_signature", Some("caspersign_contract"), DeployKind::CasperSignContract),
            ("call_faucet", Some("faucet"), DeployKind::Faucet),
            ("store_signature", None, DeployKind::Unknown),
            ("call_faucet", None, DeployKind::Unknown),
            ("call_faucet", Some("other"), DeployKind::Unknown),
            ("random", None, DeployKind::Unknown),
        ];
        for (entry_point, name, expected) in cases {
            let session = stored_session(entry_point, *name);
            assert_eq!(
                classify(&session, DEFAULT_COST).kind(),
                *expected,
                "entry point {entry_point} name {name:?}"
            );
        }
    }

    #[test]
    fn stored_contract_payload_is_extracted() {
        let session = stored_session("call_faucet", Some("faucet"));
        match classify(&session, DEFAULT_COST) {
            DeployData::Faucet(data) => {
                assert_eq!(data.amount, "1000");
                assert_eq!(data.target, "00ff");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn transfer_payload() {
        let info = transfer_deploy("t1");
        match classify_transfer(&info) {
            DeployData::Transfer(data) => {
                assert_eq!(data.hash, "t1");
                assert_eq!(data.amount, "1000");
                assert_eq!(data.target, "00ff");
                assert_eq!(data.from, info.deploy.header.account);
                assert_eq!(data.id, "7");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
