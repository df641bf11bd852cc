//! JSON-lines replay scripts.
//!
//! Each non-empty line is either a relay event (`{"type": "session_proposal", ...}`)
//! or a wallet-side operation (`{"op": "accounts_changed", ...}`). Lines
//! starting with `#` are comments.

use eyre::{Result, WrapErr};
use serde::Deserialize;
use wc_bridge_core::{Account, Blockchain, ProviderInput, TransportEvent};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalletOp {
    Connect { uri: String },
    AccountsChanged { accounts: Vec<Account> },
    UpdateSession { topic: String, servers: Vec<Blockchain> },
    Disconnect { topic: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Relay(TransportEvent),
    Wallet(WalletOp),
}

impl ScriptStep {
    pub fn into_input(self) -> ProviderInput {
        match self {
            Self::Relay(event) => ProviderInput::Transport(event),
            Self::Wallet(WalletOp::Connect { uri }) => ProviderInput::Connect(uri),
            Self::Wallet(WalletOp::AccountsChanged { accounts }) => {
                ProviderInput::AccountsChanged(accounts)
            }
            Self::Wallet(WalletOp::UpdateSession { topic, servers }) => {
                ProviderInput::UpdateSession { topic, servers }
            }
            Self::Wallet(WalletOp::Disconnect { topic }) => ProviderInput::Disconnect(topic),
        }
    }
}

/// Parses a whole script, returning each step with its 1-based line number.
pub fn parse(script: &str) -> Result<Vec<(usize, ScriptStep)>> {
    script
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            serde_json::from_str(line)
                .map(|step| (number, step))
                .wrap_err_with(|| format!("script line {number} is not a bridge step"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relay_events_and_wallet_ops() {
        let script = r#"
# pairing
{"op":"connect","uri":"wc:abc@2?relay-protocol=irn&symKey=00"}
{"type":"session_delete","topic":"t1","reason":{"code":6000,"message":"bye"}}
{"op":"accounts_changed","accounts":["eip155:1:0x1000000000000000000000000000000000000001"]}
{"op":"update_session","topic":"t1","servers":["eip155:1","eip155:137"]}
"#;
        let steps = parse(script).expect("parse");
        let numbers: Vec<usize> = steps.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![3, 4, 5, 6]);

        let inputs: Vec<ProviderInput> = steps.into_iter().map(|(_, s)| s.into_input()).collect();
        assert!(matches!(inputs[0], ProviderInput::Connect(_)));
        assert!(matches!(
            inputs[1],
            ProviderInput::Transport(TransportEvent::SessionDelete { .. })
        ));
        assert!(matches!(&inputs[2], ProviderInput::AccountsChanged(a) if a.len() == 1));
        assert!(matches!(
            &inputs[3],
            ProviderInput::UpdateSession { servers, .. } if servers.len() == 2
        ));
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse("{\"op\":\"disconnect\",\"topic\":\"t1\"}\n{\"op\":\"explode\"}")
            .expect_err("unknown op");
        assert!(err.to_string().contains("line 2"));
    }
}
