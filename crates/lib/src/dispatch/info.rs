//! Serializable summary of a dispatched request.

use serde::Serialize;
use serde_json::Value;

use crate::config::YusefConfig;
use crate::connection::Connection;
use crate::session::identity::digest;

/// Who is on the other end of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitorInfo {
    pub is_local: bool,
    pub is_owner: bool,
    pub has_cookies: bool,
}

/// Request data handed to templates and API clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    pub service_name: String,
    /// Service path without its trailing `/`.
    pub service_path: String,
    /// Stable hash of the service path, usable as a DOM id or cache key.
    pub service_path_hash: String,
    pub section: String,
    pub path: String,
    pub session_id: Option<String>,
    /// Nonce to embed in the next form.
    pub nonce: Option<String>,
    pub is_valid_nonce: bool,
    pub unite_action_data: Option<Value>,
    pub visitor: VisitorInfo,
}

impl RequestInfo {
    pub fn new(config: &YusefConfig, conn: &Connection) -> Self {
        let service_path = config.service_path.trim_end_matches('/').to_string();
        let session = conn.session();
        Self {
            service_name: config.service_name.clone(),
            service_path_hash: digest(&[&service_path]),
            service_path,
            section: conn.request.section.clone(),
            path: conn.request.path.clone(),
            session_id: session.map(|s| s.id.clone()),
            nonce: session.map(|s| s.nonce.clone()),
            is_valid_nonce: session.is_some_and(|s| s.is_valid_nonce),
            unite_action_data: conn.unite_action_data.clone(),
            visitor: VisitorInfo {
                is_local: conn.is_local,
                is_owner: conn.is_owner,
                has_cookies: conn.request.has_cookies(),
            },
        }
    }
}
