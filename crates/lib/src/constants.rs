//! Constants used throughout the Yusef library.
//!
//! This module provides central definitions for reserved section names, form
//! field names and the prefixes of the tokens handed out to clients.

/// Reserved section serving static files. Skips session and action processing.
pub const STATIC_SECTION: &str = "static";

/// Reserved section handling requests to the service root.
pub const INDEX_SECTION: &str = "_index";

/// Reserved section rendering the "not found" page.
pub const ERROR_SECTION: &str = "_error";

/// Reserved names allowed to start with an underscore.
pub const RESERVED_SECTIONS: &[&str] = &[INDEX_SECTION, ERROR_SECTION];

/// Body field carrying the name of the action to run.
pub const ACTION_FIELD: &str = "unite-action";

/// Body field carrying the nonce guarding the action.
pub const NONCE_FIELD: &str = "unite-nonce";

/// Prefix of the per-client session cookie name.
pub const COOKIE_PREFIX: &str = "ysid-";

/// Prefix of every issued nonce.
pub const NONCE_PREFIX: &str = "n-";

/// Query argument a client sets once it has shown it does not store cookies.
pub const NO_COOKIE_ARGUMENT: &str = "noCookie";
