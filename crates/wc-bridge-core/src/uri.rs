use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::{form_urlencoded, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("pairing uri is not a valid url: {0}")]
    Malformed(String),
    #[error("pairing uri must start with `wc:`")]
    MissingScheme,
    #[error("pairing uri has no topic")]
    MissingTopic,
    #[error("unsupported pairing version: {0}")]
    UnsupportedVersion(String),
    #[error("pairing uri is missing `{0}`")]
    MissingParam(&'static str),
    #[error("symKey must be 32 hex-encoded bytes")]
    InvalidSymKey,
}

/// `wc:{topic}@2?relay-protocol=irn&symKey={hex}` pairing link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub sym_key: String,
    pub relay_protocol: String,
    pub relay_data: Option<String>,
    pub expiry_timestamp: Option<u64>,
}

impl FromStr for PairingUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = Url::parse(s.trim()).map_err(|e| UriError::Malformed(e.to_string()))?;
        if parsed.scheme() != "wc" {
            return Err(UriError::MissingScheme);
        }
        let (topic, version) = parsed.path().split_once('@').ok_or(UriError::MissingTopic)?;
        if topic.is_empty() {
            return Err(UriError::MissingTopic);
        }
        if version != "2" {
            return Err(UriError::UnsupportedVersion(version.to_owned()));
        }

        let mut sym_key = None;
        let mut relay_protocol = None;
        let mut relay_data = None;
        let mut expiry_timestamp = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "symKey" => sym_key = Some(value.into_owned()),
                "relay-protocol" => relay_protocol = Some(value.into_owned()),
                "relay-data" => relay_data = Some(value.into_owned()),
                "expiryTimestamp" => expiry_timestamp = value.parse().ok(),
                _ => {}
            }
        }

        let sym_key = sym_key.ok_or(UriError::MissingParam("symKey"))?;
        if sym_key.len() != 64 || !sym_key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(UriError::InvalidSymKey);
        }
        let relay_protocol = relay_protocol
            .filter(|p| !p.is_empty())
            .ok_or(UriError::MissingParam("relay-protocol"))?;

        Ok(Self {
            topic: topic.to_owned(),
            sym_key,
            relay_protocol,
            relay_data,
            expiry_timestamp,
        })
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("relay-protocol", &self.relay_protocol)
            .append_pair("symKey", &self.sym_key);
        if let Some(data) = &self.relay_data {
            query.append_pair("relay-data", data);
        }
        if let Some(expiry) = self.expiry_timestamp {
            query.append_pair("expiryTimestamp", &expiry.to_string());
        }
        write!(f, "wc:{}@2?{}", self.topic, query.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

    #[test]
    fn parses_v2_uri() {
        let raw = format!("wc:7f6e504bfad60b48@2?relay-protocol=irn&symKey={KEY}");
        let uri: PairingUri = raw.parse().expect("valid uri");
        assert_eq!(uri.topic, "7f6e504bfad60b48");
        assert_eq!(uri.relay_protocol, "irn");
        assert_eq!(uri.sym_key, KEY);
        assert_eq!(uri.to_string(), raw);
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let uri: PairingUri = format!(
            "wc:7f6e504bfad60b48@2?relay-protocol=irn&symKey={KEY}\
             &relay-data=%7B%22a%22%3A1%7D&expiryTimestamp=1739750700"
        )
        .parse()
        .expect("valid uri");
        assert_eq!(uri.relay_data.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(uri.expiry_timestamp, Some(1_739_750_700));

        let reparsed: PairingUri = uri.to_string().parse().expect("reparse");
        assert_eq!(reparsed, uri);
    }

    #[test]
    fn rejects_v1_and_malformed_uris() {
        let v1 = "wc:8a5e5bdc-a0e4-4702-ba63-8f1a5655744f@1?bridge=https%3A%2F%2Fbridge&key=41";
        assert_eq!(
            v1.parse::<PairingUri>().expect_err("v1"),
            UriError::UnsupportedVersion("1".to_owned())
        );
        assert_eq!(
            "https://example.org".parse::<PairingUri>().expect_err("scheme"),
            UriError::MissingScheme
        );
        assert!(matches!(
            "not a pairing link".parse::<PairingUri>().expect_err("relative"),
            UriError::Malformed(_)
        ));
        assert_eq!(
            "wc:abc@2?relay-protocol=irn&symKey=zz"
                .parse::<PairingUri>()
                .expect_err("key"),
            UriError::InvalidSymKey
        );
    }
}
