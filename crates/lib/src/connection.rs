//! In-memory model of one host connection.
//!
//! The hosting web server translates each inbound HTTP request into a
//! [`Connection`], hands it to [`Dispatcher::handle`](crate::Dispatcher::handle)
//! and turns the resulting [`Response`] back into HTTP. Keeping this model
//! free of any server crate is what lets the dispatcher and the session store
//! be driven directly from tests.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::session::SessionStore;

/// Multi-valued string map used for headers, query and body items.
pub type Items = HashMap<String, Vec<String>>;

/// The request half of a connection.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// HTTP method in upper case.
    pub method: String,
    /// Request target as received, path plus optional query string.
    pub uri: String,
    /// Remote address of the peer.
    pub ip: String,
    /// Header values keyed by lower-cased header name.
    headers: Items,
    cookies: HashMap<String, String>,
    query_items: Items,
    body_items: Items,
    has_body: bool,
    /// First path segment after the service path, lower-cased.
    pub section: String,
    /// Section the request was dispatched to (`_index` for the root).
    pub section_name: String,
    /// Remainder of the path after the section, always starting with `/`.
    pub path: String,
}

impl Request {
    /// Create a request. Query items are parsed from `uri`.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let method = method.into().to_ascii_uppercase();
        let uri = uri.into();
        let mut request = Self {
            method,
            ip: "127.0.0.1".to_string(),
            ..Default::default()
        };
        if let Some((_, query)) = uri.split_once('?') {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                request
                    .query_items
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }
        request.uri = uri;
        request
    }

    /// Shorthand for a `GET` request.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    /// Shorthand for a `POST` request.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new("POST", uri)
    }

    /// Set the peer address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    /// Append a header value.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_header("user-agent", user_agent)
    }

    /// Add a cookie as if it came in the `Cookie` header.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_cookie(name, value);
        self
    }

    /// Append a parsed body field. Marks the request as carrying a body.
    pub fn with_body_item(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_body_item(name, value);
        self
    }

    /// Append a header value.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Add a cookie.
    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// Append a parsed body field. Marks the request as carrying a body.
    pub fn add_body_item(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.has_body = true;
        self.body_items
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Record that the request carried a body even if no field was parsed
    /// from it.
    pub fn set_has_body(&mut self, has_body: bool) {
        self.has_body = has_body;
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The `User-Agent` header, empty when absent.
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// Value of a cookie sent by the client.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Whether the client sent any cookie at all.
    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// First value of a query argument.
    pub fn query_item(&self, name: &str) -> Option<&str> {
        first(&self.query_items, name)
    }

    /// First value of a body field.
    pub fn body_item(&self, name: &str) -> Option<&str> {
        first(&self.body_items, name)
    }

    /// All values of a body field.
    pub fn body_items(&self, name: &str) -> &[String] {
        self.body_items.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the request carried a body (a POST in practice).
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// The URI without its query string.
    pub fn uri_path(&self) -> &str {
        self.uri.split('?').next().unwrap_or("")
    }
}

fn first<'a>(items: &'a Items, name: &str) -> Option<&'a str> {
    items
        .get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
}

/// Lifecycle of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseState {
    /// Still accepting writes.
    #[default]
    Open,
    /// Finished; the host sends what was written.
    Closed,
    /// Finished without a body; the host serves the request itself, either
    /// as a static file under the request path or as the given file.
    Redispatched(Option<PathBuf>),
}

/// The response half of a connection.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: String,
    state: ResponseState,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: String::new(),
            state: ResponseState::Open,
        }
    }
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Set a header, replacing earlier values of the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Queue a `Set-Cookie`. A later cookie of the same name wins.
    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.cookies.retain(|(n, _)| *n != name);
        self.cookies.push((name, value.into()));
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Append to the body. Ignored once the response is closed.
    pub fn write(&mut self, chunk: &str) {
        if self.state == ResponseState::Open {
            self.body.push_str(chunk);
        }
    }

    /// Drop whatever was written so far.
    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn close(&mut self) {
        if self.state == ResponseState::Open {
            self.state = ResponseState::Closed;
        }
    }

    /// Close and let the host serve the request itself.
    pub fn close_and_redispatch(&mut self, file: Option<PathBuf>) {
        if self.state == ResponseState::Open {
            self.state = ResponseState::Redispatched(file);
        }
    }

    /// Issue a `302 Found` to `location` and close.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.set_status(302);
        self.set_header("Location", location);
        self.close();
    }

    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state != ResponseState::Open
    }

    pub fn is_redispatched(&self) -> bool {
        matches!(self.state, ResponseState::Redispatched(_))
    }
}

/// Per-request view of the session, attached by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Internal session id.
    pub id: String,
    /// Nonce to embed in the next form posted by this client.
    pub nonce: String,
    /// Whether the nonce posted with this request validated.
    pub is_valid_nonce: bool,
    /// The nonce consumed by this request, if any.
    pub previous_nonce: Option<String>,
}

/// One request/response exchange with the host.
#[derive(Debug, Default)]
pub struct Connection {
    pub request: Request,
    pub response: Response,
    /// Peer is on the local machine.
    pub is_local: bool,
    /// Peer is the owner of the service.
    pub is_owner: bool,
    /// Value returned by the action handler run for this request.
    pub unite_action_data: Option<Value>,
    session: Option<SessionContext>,
    ssid: Option<String>,
    store: Option<SessionStore>,
}

impl Connection {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }

    /// Session data for this request. `None` for static requests.
    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    /// Internal session id, once resolved.
    pub fn session_id(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.response.is_closed()
    }

    pub(crate) fn bind_session(&mut self, ssid: String, store: SessionStore) {
        self.ssid = Some(ssid);
        self.store = Some(store);
    }

    pub(crate) fn set_session(&mut self, session: SessionContext) {
        self.session = Some(session);
    }

    /// Read a session variable. Returns a copy of the stored value.
    pub fn session_variable(&self, key: &str) -> Option<Value> {
        let (store, ssid) = self.store.as_ref().zip(self.ssid.as_deref())?;
        store.variable(ssid, key)
    }

    /// Store a session variable. Returns `false` when the request has no
    /// session.
    pub fn set_session_variable(&self, key: &str, value: impl Into<Value>) -> bool {
        match self.store.as_ref().zip(self.ssid.as_deref()) {
            Some((store, ssid)) => store.set_variable(ssid, key, value.into()),
            None => false,
        }
    }

    /// Remove a session variable. Returns `false` when the request has no
    /// session.
    pub fn delete_session_variable(&self, key: &str) -> bool {
        match self.store.as_ref().zip(self.ssid.as_deref()) {
            Some((store, ssid)) => store.delete_variable(ssid, key),
            None => false,
        }
    }

    /// Serve `file` in place of a handler body.
    ///
    /// `mime`, when it is a valid RFC 4288 type, becomes the `Content-Type`;
    /// `application/octet-stream` additionally marks the file as an
    /// attachment. Returns `false` if the connection is already closed or the
    /// file does not exist.
    pub fn serve_file(&mut self, file: impl Into<PathBuf>, mime: Option<&str>) -> bool {
        let file = file.into();
        if self.is_closed() || !file.is_file() {
            return false;
        }
        if let Some(mime) = mime.filter(|m| is_valid_mime_type(m)) {
            self.response.set_header("Content-Type", mime);
            if mime.eq_ignore_ascii_case("application/octet-stream") {
                self.response.set_header("Content-Disposition", "attachment");
            }
        }
        self.response.close_and_redispatch(Some(file));
        true
    }
}

/// `type/subtype`, each 1 to 127 restricted-name characters (RFC 4288 4.2).
pub fn is_valid_mime_type(mime: &str) -> bool {
    fn restricted_name(part: &str) -> bool {
        (1..=127).contains(&part.len())
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$.+-^_".contains(c))
    }

    match mime.split_once('/') {
        Some((kind, subtype)) => restricted_name(kind) && restricted_name(subtype),
        None => false,
    }
}
