//! Framework configuration.
//!
//! [`YusefConfig`] holds everything the dispatcher and the session store need
//! to know about the hosting service. Every field has a default, so a JSON
//! config file only needs to name what it changes:
//!
//! ```
//! use yusef::YusefConfig;
//!
//! let config: YusefConfig = serde_json::from_str(r#"{ "max_nonces": 10 }"#).unwrap();
//! assert_eq!(config.max_nonces, 10);
//! assert_eq!(config.session_redirect_argument, "session-redirect");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// When a recognised session token is retired in favour of a fresh one.
///
/// Rotating on state-changing requests keeps a stale copy of the token from
/// observing the result of the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Tokens are only replaced when they become invalid.
    Never,
    /// Any request carrying a body rotates the token.
    #[default]
    AnyPost,
    /// Only requests posting an action field rotate the token.
    ActionPost,
}

/// Configuration shared by the dispatcher and the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YusefConfig {
    /// Identity of the application, mixed into cookie names and nonces so
    /// that two applications on one host never share either.
    pub app_identity: String,
    /// Human readable service name, shown on the generated error page.
    pub service_name: String,
    /// Path the service is mounted under. Starts and ends with `/`.
    pub service_path: String,
    /// Number of live nonces kept per session.
    pub max_nonces: usize,
    /// Idle time after which a session token expires.
    pub session_ttl_ms: u64,
    /// Grace window during which a rotated token still maps to its successor.
    pub session_change_ttl_ms: u64,
    /// Query argument carrying the redirect causes.
    pub session_redirect_argument: String,
    /// Redirect once when a session had to be (re)created, giving the client
    /// a chance to prove it stores cookies.
    pub redirect_on_new_session: bool,
    /// Which requests rotate the session token.
    pub rotation: RotationPolicy,
}

impl Default for YusefConfig {
    fn default() -> Self {
        Self {
            app_identity: "yusef".to_string(),
            service_name: "yusef".to_string(),
            service_path: "/".to_string(),
            max_nonces: 100,
            session_ttl_ms: 30 * 60 * 1000,
            session_change_ttl_ms: 5 * 1000,
            session_redirect_argument: "session-redirect".to_string(),
            redirect_on_new_session: true,
            rotation: RotationPolicy::AnyPost,
        }
    }
}

impl YusefConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nonces == 0 {
            return Err(ConfigError::Invalid {
                field: "max_nonces",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.service_path.starts_with('/') || !self.service_path.ends_with('/') {
            return Err(ConfigError::Invalid {
                field: "service_path",
                reason: format!("'{}' must start and end with '/'", self.service_path),
            });
        }
        if self.session_change_ttl_ms > self.session_ttl_ms {
            return Err(ConfigError::Invalid {
                field: "session_change_ttl_ms",
                reason: "must not exceed session_ttl_ms".to_string(),
            });
        }
        if self.session_redirect_argument.is_empty() {
            return Err(ConfigError::Invalid {
                field: "session_redirect_argument",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors raised while loading or validating a [`YusefConfig`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}
