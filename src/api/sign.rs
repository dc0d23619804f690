use super::Error;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Flattened request parameters; `BTreeMap` keeps keys in canonical (sorted) order.
pub type FlatParams = BTreeMap<String, String>;

pub const ACCESS_KEY: &str = "accessKey";
pub const NONCE: &str = "nonce";
pub const TIMESTAMP: &str = "timestamp";
pub const SIGN: &str = "sign";

/// Authentication headers of a single request. Never reuse for another request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub nonce: String,
    pub timestamp: String,
    pub sign: String,
}

impl SignedHeaders {
    /// Sign `params` with a fresh nonce and the current time.
    pub fn new(access_key: &str, secret: &str, params: Option<&Value>) -> Result<Self, Error> {
        Self::with_nonce(access_key, secret, params, fresh_nonce(), now_millis()?)
    }

    pub fn with_nonce(
        access_key: &str,
        secret: &str,
        params: Option<&Value>,
        nonce: String,
        timestamp: String,
    ) -> Result<Self, Error> {
        let flat = params.map(flatten).unwrap_or_default();
        let sign = sign(&flat, access_key, &nonce, &timestamp, secret)?;

        Ok(SignedHeaders {
            access_key: access_key.to_owned(),
            nonce,
            timestamp,
            sign,
        })
    }
}

/// Flatten nested JSON into path keys: object keys joined by `.`, array items as `[i]`.
///
/// `{"params":{"quotas":["a"]}}` becomes `{"params.quotas[0]": "a"}`. Empty objects and
/// arrays contribute nothing.
pub fn flatten(value: &Value) -> FlatParams {
    let mut flat = FlatParams::new();
    flatten_into(value, String::new(), &mut flat);
    flat
}

fn flatten_into(value: &Value, prefix: String, flat: &mut FlatParams) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                let path = if prefix.is_empty() {
                    key.to_owned()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(item, path, flat);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(item, format!("{}[{}]", prefix, i), flat);
            }
        }
        Value::String(s) => {
            flat.insert(prefix, s.to_owned());
        }
        other => {
            flat.insert(prefix, other.to_string());
        }
    }
}

pub fn query_string(params: &FlatParams) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// String that gets signed: body pairs (if any), then the header pairs.
pub fn canonical_string(
    params: &FlatParams,
    access_key: &str,
    nonce: &str,
    timestamp: &str,
) -> String {
    let headers = FlatParams::from([
        (ACCESS_KEY.to_owned(), access_key.to_owned()),
        (NONCE.to_owned(), nonce.to_owned()),
        (TIMESTAMP.to_owned(), timestamp.to_owned()),
    ]);

    if params.is_empty() {
        query_string(&headers)
    } else {
        format!("{}&{}", query_string(params), query_string(&headers))
    }
}

pub fn sign(
    params: &FlatParams,
    access_key: &str,
    nonce: &str,
    timestamp: &str,
    secret: &str,
) -> Result<String, Error> {
    let canonical = canonical_string(params, access_key, nonce, timestamp);
    log::debug!("signing: {}", canonical);
    hmac_sha256(&canonical, secret)
}

fn hmac_sha256(data: &str, key: &str) -> Result<String, Error> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).or(Err(Error::InternalError))?;
    mac.update(data.as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

/// Six digit decimal nonce.
pub fn fresh_nonce() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

fn now_millis() -> Result<String, Error> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .or(Err(Error::InternalError))
}
