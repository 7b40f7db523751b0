//! Request dispatch.
//!
//! [`Dispatcher::handle`] drives one connection through
//!
//! 1. routing: the first path segment below the service path picks the
//!    section (`_index` for the root, the `_error` page or a generated
//!    listing with status 404 when nothing is registered under it),
//! 2. session setup: the session is resolved, the posted nonce validated and
//!    a fresh nonce issued (skipped for `static`),
//! 3. action processing: a posted `unite-action` runs when its nonce
//!    validated (skipped for `static`),
//! 4. the section handler, wrapped by the middleware chain,
//! 5. closing: the handler's body is written unless the connection was
//!    already closed or redispatched.
//!
//! Handler errors and panics are contained to the request and answered with
//! status 500.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::config::YusefConfig;
use crate::connection::Connection;
use crate::constants::{ACTION_FIELD, ERROR_SECTION, STATIC_SECTION};
use crate::middleware::{Middleware, Next};
use crate::registry::{ActionRegistry, RegistryError, SectionHandler, SectionRegistry};
use crate::session::SessionStore;
use crate::{Error, Result};

mod info;
mod route;

pub use info::{RequestInfo, VisitorInfo};
pub use route::Route;


/// Routes connections to sections and owns everything a request needs.
pub struct Dispatcher {
    config: Arc<YusefConfig>,
    sessions: SessionStore,
    sections: SectionRegistry,
    actions: ActionRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("service_path", &self.config.service_path)
            .field("sections", &self.sections)
            .field("actions", &self.actions)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Handler of the built-in `static` section: the host serves the file.
fn redispatch_static(conn: &mut Connection) -> Result<Option<String>> {
    conn.response.close_and_redispatch(None);
    Ok(None)
}

impl Dispatcher {
    /// Create a dispatcher around an existing session store. The `static`
    /// section is registered up front.
    pub fn new(config: Arc<YusefConfig>, sessions: SessionStore) -> Self {
        let mut sections = SectionRegistry::new();
        let registered = sections.register(STATIC_SECTION, redispatch_static);
        debug_assert!(registered.is_ok());
        Self {
            config,
            sessions,
            sections,
            actions: ActionRegistry::new(),
            middleware: Vec::new(),
        }
    }

    /// Create a dispatcher with its own session store on the system clock.
    pub fn from_config(config: YusefConfig) -> Self {
        let config = Arc::new(config);
        let sessions = SessionStore::new(config.clone());
        Self::new(config, sessions)
    }

    pub fn config(&self) -> &YusefConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn sections(&self) -> &SectionRegistry {
        &self.sections
    }

    /// Listen to every request below `<service_path><name>/`.
    pub fn register_section<F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&mut Connection) -> Result<Option<String>> + Send + Sync + 'static,
    {
        let result = self.sections.register(name, handler);
        debug!(section = name, ok = result.is_ok(), "register section");
        result
    }

    /// Run `handler` when a form posts `unite-action=<name>` with a valid
    /// nonce.
    pub fn register_action<F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&mut Connection) -> Result<Value> + Send + Sync + 'static,
    {
        let result = self.actions.register(name, handler);
        debug!(action = name, ok = result.is_ok(), "register action");
        result
    }

    /// Append a middleware. Middleware registered first runs outermost.
    pub fn add_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Dispatch one connection.
    pub fn handle(&self, conn: &mut Connection) {
        let route = Route::parse(&conn.request.uri, &self.config.service_path);
        conn.request.section = route.section;
        conn.request.section_name = route.section_name;
        conn.request.path = route.path;
        let section_name = conn.request.section_name.clone();

        let Some(handler) = self.sections.resolve(&section_name) else {
            debug!(section = %section_name, uri = %conn.request.uri, "no section listener");
            self.emit_error_page(conn);
            return;
        };
        debug!(
            ip = %conn.request.ip,
            uri = %conn.request.uri,
            section = %section_name,
            path = %conn.request.path,
            "dispatching request"
        );

        let is_static = section_name == STATIC_SECTION;
        if !is_static {
            self.sessions.setup(conn);
        }
        // the session redirect closes the connection
        if conn.is_closed() {
            return;
        }

        let result = contain(|| self.run_section(conn, &handler, is_static));
        match result {
            Ok(body) => {
                if !conn.is_closed() {
                    conn.response.write(body.as_deref().unwrap_or(""));
                    conn.response.close();
                }
            }
            Err(err) => {
                error!(
                    section = %section_name,
                    uri = %conn.request.uri,
                    error = %err,
                    "section handler failed"
                );
                emit_failure(conn);
            }
        }
    }

    fn run_section(
        &self,
        conn: &mut Connection,
        handler: &SectionHandler,
        is_static: bool,
    ) -> Result<Option<String>> {
        if !is_static {
            conn.unite_action_data = self.process_action(conn)?;
            if conn.is_closed() {
                return Ok(None);
            }
        }
        Next::new(&self.middleware, handler).run(conn)
    }

    fn process_action(&self, conn: &mut Connection) -> Result<Option<Value>> {
        let Some(name) = conn.request.body_item(ACTION_FIELD).map(str::to_string) else {
            return Ok(None);
        };
        if !conn.session().is_some_and(|s| s.is_valid_nonce) {
            debug!(action = %name, "nonce missing or invalid, skipping action");
            return Ok(None);
        }
        let Some(handler) = self.actions.resolve(&name) else {
            debug!(action = %name, "no action listener");
            return Ok(None);
        };
        debug!(action = %name, "running action");
        handler(conn).map(Some)
    }

    /// Answer with 404, rendered by the `_error` section when registered.
    pub fn emit_error_page(&self, conn: &mut Connection) {
        conn.response.set_status(404);
        let body = match self.sections.resolve(ERROR_SECTION) {
            Some(handler) => match contain(|| handler(conn)) {
                Ok(body) => body.unwrap_or_default(),
                Err(err) => {
                    error!(uri = %conn.request.uri, error = %err, "error page handler failed");
                    self.section_listing()
                }
            },
            None => {
                conn.response
                    .set_header("Content-Type", "text/html; charset=utf-8");
                self.section_listing()
            }
        };
        if !conn.is_closed() {
            conn.response.write(&body);
            conn.response.close();
        }
    }

    /// Generated "not found" page linking every public section.
    pub fn section_listing(&self) -> String {
        let mut out = format!(
            "<!doctype html>\n<style>\nbody{{font:.8em/1.5em sans-serif;}}\nh1{{font-weight:normal;}}\n</style>\n\
             <h1>Resource not found in the {} application</h1>\n\
             <p>Try any of the following section(s):</p>\n<ul>",
            escape_html(&self.config.service_name)
        );
        for name in self.sections.names().filter(|n| !n.starts_with('_')) {
            out.push_str(&format!(
                "\n\t<li><a href=\"{}{}\">{}</a></li>",
                escape_html(&self.config.service_path),
                escape_html(name),
                escape_html(name)
            ));
        }
        out.push_str("\n</ul>");
        out
    }

    /// Snapshot of the request for templates and API responses.
    pub fn request_info(&self, conn: &Connection) -> RequestInfo {
        RequestInfo::new(&self.config, conn)
    }
}

/// Run handler code, turning a panic into an error.
fn contain<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Error::Handler {
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn emit_failure(conn: &mut Connection) {
    if conn.is_closed() {
        return;
    }
    conn.response.clear_body();
    conn.response.set_status(500);
    conn.response
        .set_header("Content-Type", "text/html; charset=utf-8");
    conn.response.write(
        "<!doctype html>\n<h1>Internal error</h1>\n<p>The request could not be completed.</p>",
    );
    conn.response.close();
}

/// Escape text for HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
