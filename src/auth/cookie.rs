//! Approved-clients cookie
//!
//! A browser that has approved an MCP client once should not see the
//! approval dialog for it again. The set of approved client ids is kept in
//! a cookie signed with HMAC-SHA256 under the configured cookie secret.
//! The server only ever verifies; a bad signature reads as an empty set.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Client ids this browser has approved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovedClients {
    clients: BTreeSet<String>,
}

impl ApprovedClients {
    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains(client_id)
    }

    pub fn add(&mut self, client_id: impl Into<String>) {
        self.clients.insert(client_id.into());
    }

    /// Serialize and sign: `base64(json).hex(hmac)`.
    pub fn encode(&self, secret: &str) -> String {
        let ids: Vec<&String> = self.clients.iter().collect();
        let payload = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string());
        let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signature = sign(secret, encoded.as_bytes());
        format!("{}.{}", encoded, signature)
    }

    /// Verify and parse. Any failure (bad shape, bad signature, bad JSON)
    /// yields None; callers treat that as "nothing approved".
    pub fn decode(value: &str, secret: &str) -> Option<Self> {
        let (encoded, signature) = value.split_once('.')?;
        let expected = sign(secret, encoded.as_bytes());
        if expected
            .as_bytes()
            .ct_eq(signature.as_bytes())
            .unwrap_u8()
            == 0
        {
            return None;
        }
        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let ids: Vec<String> = serde_json::from_slice(&payload).ok()?;
        Some(Self {
            clients: ids.into_iter().collect(),
        })
    }
}

fn sign(secret: &str, data: &[u8]) -> String {
    // A short secret is a config error caught at startup; an empty key
    // still produces a valid (if useless) MAC rather than a panic.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Extract a named cookie from a Cookie header value.
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .map(|part| part.trim())
        .find_map(|part| part.strip_prefix(name)?.strip_prefix('='))
}
