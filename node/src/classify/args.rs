//! Runtime argument readers used by payload extraction.

use crate::chain::RuntimeArgs;
use serde_json::Value;

const ACCOUNT_HASH_PREFIX: &str = "account-hash-";

/// Parsed value rendered as a string; missing arguments and nulls read as empty.
pub(crate) fn string(args: &RuntimeArgs, name: &str) -> String {
    args.get(name)
        .map(|value| value_to_string(&value.parsed))
        .unwrap_or_default()
}

/// Hex public key, only when the argument is typed as a public key.
pub(crate) fn public_key(args: &RuntimeArgs, name: &str) -> String {
    match args.get(name) {
        Some(value) if value.cl_type.as_str() == Some("PublicKey") => {
            value_to_string(&value.parsed)
        }
        _ => String::new(),
    }
}

/// Account hash as bare hex, accepting `account-hash-…` strings and `{"Account": …}` keys.
pub(crate) fn account_hash(args: &RuntimeArgs, name: &str) -> String {
    let Some(value) = args.get(name) else {
        return String::new();
    };
    let raw = match &value.parsed {
        Value::String(raw) => raw.as_str(),
        Value::Object(map) => match map.values().next().and_then(Value::as_str) {
            Some(raw) => raw,
            None => return String::new(),
        },
        _ => return String::new(),
    };
    raw.strip_prefix(ACCOUNT_HASH_PREFIX).unwrap_or(raw).to_string()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CLValue;
    use serde_json::json;

    fn args(values: Vec<(&str, Value, Value)>) -> RuntimeArgs {
        RuntimeArgs::new(
            values
                .into_iter()
                .map(|(name, cl_type, parsed)| {
                    (
                        name.to_string(),
                        CLValue {
                            cl_type,
                            bytes: String::new(),
                            parsed,
                        },
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn reads_strings_numbers_and_nulls() {
        let args = args(vec![
            ("amount", json!("U512"), json!("2500000000")),
            ("weight", json!("U8"), json!(3)),
            ("id", json!({"Option": "U64"}), Value::Null),
        ]);
        assert_eq!(string(&args, "amount"), "2500000000");
        assert_eq!(string(&args, "weight"), "3");
        assert_eq!(string(&args, "id"), "");
        assert_eq!(string(&args, "missing"), "");
    }

    #[test]
    fn public_key_requires_public_key_type() {
        let args = args(vec![
            ("validator", json!("PublicKey"), json!("01abcd")),
            ("delegator", json!("String"), json!("01ef")),
        ]);
        assert_eq!(public_key(&args, "validator"), "01abcd");
        assert_eq!(public_key(&args, "delegator"), "");
    }

    #[test]
    fn account_hash_strips_prefix() {
        let args = args(vec![
            ("target", json!({"ByteArray": 32}), json!("account-hash-00ff")),
            ("account", json!("Key"), json!({"Account": "account-hash-aa11"})),
            ("raw", json!({"ByteArray": 32}), json!("beef")),
        ]);
        assert_eq!(account_hash(&args, "target"), "00ff");
        assert_eq!(account_hash(&args, "account"), "aa11");
        assert_eq!(account_hash(&args, "raw"), "beef");
        assert_eq!(account_hash(&args, "absent"), "");
    }
}
