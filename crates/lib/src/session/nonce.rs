//! One-time CSRF tokens bound to a session record.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use serde_json::Value;

use super::identity::digest;
use crate::constants::NONCE_PREFIX;

/// Server side state of one session.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    /// Most recently issued nonce.
    pub nonce: String,
    nonces: VecDeque<String>,
    pub(crate) storage: HashMap<String, Value>,
    /// Whether the nonce presented with the current request validated.
    pub is_valid_nonce: bool,
    /// Nonce consumed by the current request.
    pub previous_nonce: Option<String>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live nonces, oldest first.
    pub fn nonces(&self) -> impl Iterator<Item = &str> {
        self.nonces.iter().map(String::as_str)
    }

    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }

    /// Forget the per-request validation state.
    pub(crate) fn begin_request(&mut self) {
        self.is_valid_nonce = false;
        self.previous_nonce = None;
    }
}

/// Issues and validates nonces.
#[derive(Debug, Clone)]
pub struct NonceManager {
    app_identity: String,
    max_nonces: usize,
}

impl NonceManager {
    pub fn new(app_identity: impl Into<String>, max_nonces: usize) -> Self {
        Self {
            app_identity: app_identity.into(),
            max_nonces: max_nonces.max(1),
        }
    }

    /// Generate a nonce for `record` and make it the current one.
    ///
    /// The oldest live nonce is dropped once more than `max_nonces` are held.
    pub fn issue(&self, record: &mut SessionRecord, ssid: &str, uri: &str) -> String {
        let salt: u64 = rand::thread_rng().r#gen();
        let nonce = format!(
            "{NONCE_PREFIX}{}",
            digest(&[&self.app_identity, ssid, &salt.to_string(), uri])
        );
        record.nonces.push_back(nonce.clone());
        while record.nonces.len() > self.max_nonces {
            record.nonces.pop_front();
        }
        record.nonce = nonce.clone();
        nonce
    }

    /// Consume `presented` if it is one of the live nonces of `record`.
    pub fn validate(&self, record: &mut SessionRecord, presented: &str) -> bool {
        let Some(index) = record.nonces.iter().position(|n| n == presented) else {
            return false;
        };
        record.nonces.remove(index);
        record.is_valid_nonce = true;
        record.previous_nonce = Some(presented.to_string());
        true
    }
}
