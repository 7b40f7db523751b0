//!
//! Yusef: request routing, cookie sessions and one-time form nonces for small
//! web applications.
//!
//! ## Core Concepts
//!
//! * **Connections (`connection::Connection`)**: One request/response pair as seen by
//!   handlers, carrying the resolved session and nonce.
//! * **Sections (`registry::SectionRegistry`)**: Handlers keyed by the first path segment
//!   below the service path. `_index` answers the root, `_error` renders 404 pages and
//!   `static` hands the request back to the host for file serving.
//! * **Actions (`registry::ActionRegistry`)**: Named operations triggered by a posted
//!   `unite-action` field. They only run when the posted `unite-nonce` is valid.
//! * **Sessions (`session::SessionStore`)**: Server-side session records addressed by
//!   rotating cookie tokens, bound to the client's IP chain and user agent.
//! * **Nonces (`session::NonceManager`)**: Bounded sets of single-use tokens per session
//!   protecting form posts against replay and cross-site submission.
//! * **Dispatcher (`dispatch::Dispatcher`)**: Drives a connection through routing, session
//!   setup, action processing, middleware and the section handler.
//!
//! The crate does no network I/O. A host adapter turns its own request type into a
//! [`Connection`], calls [`Dispatcher::handle`] and writes the [`Response`] back.

pub mod clock;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatch;
pub mod middleware;
pub mod registry;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RotationPolicy, YusefConfig};
pub use connection::{Connection, Request, Response, ResponseState, SessionContext};
pub use dispatch::{Dispatcher, RequestInfo, Route, VisitorInfo, escape_html};
pub use middleware::{Middleware, Next, Timing};
pub use registry::{ActionHandler, ActionRegistry, RegistryError, SectionHandler, SectionRegistry};
pub use session::{
    NonceManager, RedirectCause, SessionRecord, SessionStats, SessionStore, SweepReport,
};

/// Result type used throughout the Yusef library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Yusef library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured configuration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),

    /// Structured registration errors from the registry module
    #[error(transparent)]
    Registry(registry::RegistryError),

    /// A section or action handler failed
    #[error("Handler failed: {reason}")]
    Handler { reason: String },
}

impl Error {
    /// Convenience constructor for handler failures.
    pub fn handler(reason: impl Into<String>) -> Self {
        Error::Handler {
            reason: reason.into(),
        }
    }

    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Registry(_) => "registry",
            Error::Handler { .. } => "handler",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a conflict (already registered).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Registry(registry_err) => registry_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error is configuration-related.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this error came from a handler.
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Error::Handler { .. })
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
