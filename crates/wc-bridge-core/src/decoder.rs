//! Turns raw session requests into typed wallet actions.

use alloy::primitives::{hex, Address, Bytes};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Action, AddChainRequest, SessionRequest, TransactionRequest, EIP155};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported chain namespace: {0}")]
    UnsupportedNamespace(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}

pub fn decode_request(request: &SessionRequest) -> Result<Action, DecodeError> {
    if request.chain.namespace() != EIP155 {
        return Err(DecodeError::UnsupportedNamespace(
            request.chain.namespace().to_owned(),
        ));
    }
    let method = request.method.as_str();
    let invalid = |reason: &str| DecodeError::InvalidParams {
        method: method.to_owned(),
        reason: reason.to_owned(),
    };
    let params = request
        .params
        .as_array()
        .ok_or_else(|| invalid("params must be an array"))?;

    match method {
        "eth_sendTransaction" => Ok(Action::SendTransaction(transaction(params, &invalid)?)),
        "eth_signTransaction" => Ok(Action::SignTransaction(transaction(params, &invalid)?)),
        "eth_sign" => {
            let address = address_at(params, 0, &invalid)?;
            let message = message_at(params, 1, &invalid)?;
            Ok(Action::SignMessage { address, message })
        }
        "personal_sign" => {
            // Some dApps send [address, message] instead of [message, address].
            let (message_idx, address_idx) =
                if is_address(params.first()) && !is_address(params.get(1)) {
                    (1, 0)
                } else {
                    (0, 1)
                };
            let message = message_at(params, message_idx, &invalid)?;
            let address = address_at(params, address_idx, &invalid)?;
            Ok(Action::SignPersonalMessage { address, message })
        }
        "eth_signTypedData" => {
            // Legacy v1 payloads put the typed data array first.
            let (data_idx, address_idx) = if is_address(params.first()) {
                (1, 0)
            } else {
                (0, 1)
            };
            let address = address_at(params, address_idx, &invalid)?;
            let typed_data = typed_data_at(params, data_idx, &invalid)?;
            Ok(Action::SignTypedData {
                address,
                typed_data,
            })
        }
        "eth_signTypedData_v4" => {
            let address = address_at(params, 0, &invalid)?;
            let typed_data = typed_data_at(params, 1, &invalid)?;
            if !typed_data.is_object() {
                return Err(invalid("typed data v4 must be an object"));
            }
            Ok(Action::SignTypedDataV4 {
                address,
                typed_data,
            })
        }
        "wallet_switchEthereumChain" => {
            let chain_id = params
                .first()
                .and_then(|p| p.get("chainId"))
                .ok_or_else(|| invalid("missing chainId"))
                .and_then(|v| quantity(v).ok_or_else(|| invalid("chainId is not a quantity")))?;
            Ok(Action::SwitchChain { chain_id })
        }
        "wallet_addEthereumChain" => {
            let raw = params.first().ok_or_else(|| invalid("missing chain parameters"))?;
            Ok(Action::AddChain(add_chain(raw, &invalid)?))
        }
        other => Err(DecodeError::UnsupportedMethod(other.to_owned())),
    }
}

fn transaction(
    params: &[Value],
    invalid: &dyn Fn(&str) -> DecodeError,
) -> Result<TransactionRequest, DecodeError> {
    let raw = params
        .first()
        .filter(|v| v.is_object())
        .ok_or_else(|| invalid("missing transaction object"))?;
    let tx: TransactionRequest =
        serde_json::from_value(raw.clone()).map_err(|e| invalid(&e.to_string()))?;
    if tx.from.is_none() {
        return Err(invalid("transaction is missing `from`"));
    }
    Ok(tx)
}

fn is_address(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| s.len() == 42 && s.parse::<Address>().is_ok())
}

fn address_at(
    params: &[Value],
    idx: usize,
    invalid: &dyn Fn(&str) -> DecodeError,
) -> Result<Address, DecodeError> {
    params
        .get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing address"))?
        .parse()
        .map_err(|e| invalid(&format!("invalid address: {e}")))
}

/// Hex payloads are decoded; anything else is signed as its UTF-8 bytes.
fn message_at(
    params: &[Value],
    idx: usize,
    invalid: &dyn Fn(&str) -> DecodeError,
) -> Result<Bytes, DecodeError> {
    let raw = params
        .get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing message"))?;
    if raw.starts_with("0x") {
        if let Ok(bytes) = hex::decode(raw) {
            return Ok(Bytes::from(bytes));
        }
    }
    Ok(Bytes::copy_from_slice(raw.as_bytes()))
}

fn typed_data_at(
    params: &[Value],
    idx: usize,
    invalid: &dyn Fn(&str) -> DecodeError,
) -> Result<Value, DecodeError> {
    match params.get(idx) {
        Some(Value::String(s)) => {
            serde_json::from_str(s).map_err(|e| invalid(&format!("typed data is not JSON: {e}")))
        }
        Some(v @ (Value::Object(_) | Value::Array(_))) => Ok(v.clone()),
        _ => Err(invalid("missing typed data")),
    }
}

fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(digits) => u64::from_str_radix(digits, 16).ok(),
            None => s.parse().ok(),
        },
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn add_chain(
    raw: &Value,
    invalid: &dyn Fn(&str) -> DecodeError,
) -> Result<AddChainRequest, DecodeError> {
    let chain_id = raw
        .get("chainId")
        .and_then(quantity)
        .ok_or_else(|| invalid("missing chainId"))?;
    let chain_name = raw
        .get("chainName")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing chainName"))?
        .to_owned();
    let strings = |key: &str| -> Vec<String> {
        raw.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    };
    let rpc_urls = strings("rpcUrls");
    if rpc_urls.is_empty() {
        return Err(invalid("rpcUrls must not be empty"));
    }
    let native_currency = match raw.get("nativeCurrency") {
        Some(v) => Some(
            serde_json::from_value(v.clone())
                .map_err(|e| invalid(&format!("invalid nativeCurrency: {e}")))?,
        ),
        None => None,
    };
    Ok(AddChainRequest {
        chain_id,
        chain_name,
        rpc_urls,
        native_currency,
        block_explorer_urls: strings("blockExplorerUrls"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::Blockchain;

    const OWNER: &str = "0x1000000000000000000000000000000000000001";

    fn request(method: &str, params: Value) -> SessionRequest {
        SessionRequest {
            id: 1,
            topic: "topic".to_owned(),
            chain: Blockchain::eip155(1),
            method: method.to_owned(),
            params,
        }
    }

    #[test]
    fn decodes_send_transaction() {
        let action = decode_request(&request(
            "eth_sendTransaction",
            json!([{ "from": OWNER, "to": OWNER, "value": "0x10", "data": "0xdeadbeef" }]),
        ))
        .expect("decode");
        let tx = match action {
            Action::SendTransaction(tx) => tx,
            other => panic!("unexpected action: {other:?}"),
        };
        assert_eq!(tx.from, Some(OWNER.parse().expect("address")));
        assert_eq!(tx.data, Some(Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])));
    }

    #[test]
    fn transaction_without_from_is_rejected() {
        let err = decode_request(&request("eth_sendTransaction", json!([{ "to": OWNER }])))
            .expect_err("must fail");
        assert!(err.to_string().contains("from"));
    }

    #[test]
    fn personal_sign_accepts_either_param_order() {
        let expected = Action::SignPersonalMessage {
            address: OWNER.parse().expect("address"),
            message: Bytes::from(b"hello".to_vec()),
        };
        let a = decode_request(&request("personal_sign", json!(["0x68656c6c6f", OWNER])))
            .expect("message first");
        let b = decode_request(&request("personal_sign", json!([OWNER, "hello"])))
            .expect("address first");
        assert_eq!(a, expected);
        assert_eq!(b, expected);
    }

    #[test]
    fn typed_data_v4_parses_string_payload() {
        let action = decode_request(&request(
            "eth_signTypedData_v4",
            json!([OWNER, "{\"primaryType\":\"Mail\"}"]),
        ))
        .expect("decode");
        assert_eq!(
            action,
            Action::SignTypedDataV4 {
                address: OWNER.parse().expect("address"),
                typed_data: json!({ "primaryType": "Mail" }),
            }
        );
    }

    #[test]
    fn switch_chain_reads_hex_quantity() {
        let action = decode_request(&request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": "0x89" }]),
        ))
        .expect("decode");
        assert_eq!(action, Action::SwitchChain { chain_id: 137 });
    }

    #[test]
    fn add_chain_requires_rpc_urls() {
        let err = decode_request(&request(
            "wallet_addEthereumChain",
            json!([{ "chainId": "0xa", "chainName": "Optimism", "rpcUrls": [] }]),
        ))
        .expect_err("must fail");
        assert!(matches!(err, DecodeError::InvalidParams { .. }));
    }

    #[test]
    fn unknown_method_and_namespace_fail() {
        let err = decode_request(&request("eth_getBalance", json!([]))).expect_err("unknown");
        assert_eq!(
            err,
            DecodeError::UnsupportedMethod("eth_getBalance".to_owned())
        );

        let mut req = request("personal_sign", json!(["0x00", OWNER]));
        req.chain = "solana:4sGjMW1sUnHzSxGspuhpqLDx6wiyjNtZ".parse().expect("chain");
        let err = decode_request(&req).expect_err("non-evm");
        assert_eq!(err, DecodeError::UnsupportedNamespace("solana".to_owned()));
    }
}
