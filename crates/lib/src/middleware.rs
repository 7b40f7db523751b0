//! Decorators around section handlers.
//!
//! Middleware is composed once, at startup, in registration order: the first
//! registered middleware sees the request first and the response last. Each
//! one decides whether to call [`Next::run`] and may inspect or replace what
//! the rest of the chain returns.
//!
//! ```
//! use yusef::{Connection, Middleware, Next, Result};
//!
//! struct Footer;
//!
//! impl Middleware for Footer {
//!     fn call(&self, conn: &mut Connection, next: Next<'_>) -> Result<Option<String>> {
//!         let body = next.run(conn)?;
//!         Ok(body.map(|b| format!("{b}\n<footer>yusef</footer>")))
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::Result;
use crate::connection::Connection;
use crate::registry::SectionHandler;

/// A decorator around the section handler.
pub trait Middleware: Send + Sync {
    fn call(&self, conn: &mut Connection, next: Next<'_>) -> Result<Option<String>>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Connection, Next<'_>) -> Result<Option<String>> + Send + Sync,
{
    fn call(&self, conn: &mut Connection, next: Next<'_>) -> Result<Option<String>> {
        self(conn, next)
    }
}

/// The remainder of the chain, ending in the section handler.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    handler: &'a SectionHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], handler: &'a SectionHandler) -> Self {
        Self { chain, handler }
    }

    /// Run the rest of the chain.
    pub fn run(self, conn: &mut Connection) -> Result<Option<String>> {
        match self.chain.split_first() {
            Some((first, rest)) => first.call(conn, Next::new(rest, self.handler)),
            None => (self.handler)(conn),
        }
    }
}

/// Logs how long the rest of the chain took.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing;

impl Middleware for Timing {
    fn call(&self, conn: &mut Connection, next: Next<'_>) -> Result<Option<String>> {
        let started = Instant::now();
        let result = next.run(conn);
        debug!(
            section = %conn.request.section_name,
            uri = %conn.request.uri,
            elapsed = ?started.elapsed(),
            ok = result.is_ok(),
            "section handler finished"
        );
        result
    }
}
