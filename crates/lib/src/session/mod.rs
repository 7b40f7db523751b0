//! Cookie sessions.
//!
//! A client holds a public, rotating token (the *ysid*) in a cookie whose name
//! is derived from the application identity, its address chain and its user
//! agent. The [`SessionStore`] maps that token through the *prism* table to an
//! internal session id (the *ssid*) that owns the session record: nonces and
//! session variables. The ssid never leaves the server in a cookie.
//!
//! Resolution copes with:
//!
//! * missing cookies (a fresh session, optionally a one-time redirect so the
//!   client can prove it stores cookies),
//! * tokens presented from another address or user agent, or idle beyond the
//!   session TTL (the session is destroyed and recreated),
//! * token rotation on state changing requests, with a grace window during
//!   which the retired token still leads to the new one,
//! * garbage collection of single-hit visits, stale rotations and orphaned
//!   records, driven by request traffic or [`SessionStore::sweep`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{RotationPolicy, YusefConfig};
use crate::connection::{Connection, Request, SessionContext};
use crate::constants::{ACTION_FIELD, NO_COOKIE_ARGUMENT, NONCE_FIELD};

pub mod identity;
pub mod nonce;

pub use identity::{cookie_name, ip_chain};
pub use nonce::{NonceManager, SessionRecord};


/// Why a request was redirected while its session was set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RedirectCause {
    /// No session cookie was presented.
    NoCookie,
    /// The token was issued to another address.
    IpConflict,
    /// The token was issued to another user agent.
    UaConflict,
    /// The token was idle longer than the session TTL.
    Expired,
}

impl RedirectCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectCause::NoCookie => "noCookie",
            RedirectCause::IpConflict => "ipConflict",
            RedirectCause::UaConflict => "uaConflict",
            RedirectCause::Expired => "expired",
        }
    }
}

impl fmt::Display for RedirectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding of a public token to a session record and a client.
#[derive(Debug, Clone)]
struct PrismEntry {
    ip: String,
    user_agent: String,
    ssid: String,
    last_seen: u64,
    hit_count: u64,
}

/// A retired token and the token that replaced it.
#[derive(Debug, Clone)]
struct ChangingEntry {
    new_token: String,
    when: u64,
}

#[derive(Debug, Default)]
struct SessionTables {
    prism: HashMap<String, PrismEntry>,
    records: HashMap<String, SessionRecord>,
    changing: HashMap<String, ChangingEntry>,
}

/// Counts of what a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub changing: usize,
    pub prism: usize,
    pub records: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.changing == 0 && self.prism == 0 && self.records == 0
    }
}

impl SessionTables {
    fn unused_token(&self) -> String {
        loop {
            let token = identity::mint_id();
            if !self.prism.contains_key(&token) && !self.changing.contains_key(&token) {
                return token;
            }
        }
    }

    fn create_record(&mut self) -> String {
        loop {
            let ssid = identity::mint_id();
            if !self.records.contains_key(&ssid) {
                self.records.insert(ssid.clone(), SessionRecord::new());
                return ssid;
            }
        }
    }

    /// Drop a token together with the record it points to.
    fn invalidate(&mut self, token: &str) {
        if let Some(entry) = self.prism.remove(token) {
            self.records.remove(&entry.ssid);
        }
    }

    /// Retire `old` in favour of `new`, including rotations already pointing
    /// at `old`.
    fn flag_changing(&mut self, old: &str, new: &str, now: u64) {
        for entry in self.changing.values_mut() {
            if entry.new_token == old {
                entry.new_token = new.to_string();
            }
        }
        self.changing
            .entry(old.to_string())
            .or_insert_with(|| ChangingEntry {
                new_token: new.to_string(),
                when: now,
            });
    }

    fn sweep(&mut self, now: u64, session_ttl: u64, change_ttl: u64) -> SweepReport {
        let then = now.saturating_sub(change_ttl);
        // Idle tokens linger for a second TTL so a returning client is still
        // told its session expired.
        let expired_before = now.saturating_sub(session_ttl.saturating_mul(2));

        let changing_before = self.changing.len();
        self.changing.retain(|_, entry| entry.when >= then);

        let prism_before = self.prism.len();
        self.prism.retain(|_, entry| {
            let single_hit = entry.hit_count == 1 && entry.last_seen < then;
            let expired = entry.last_seen < expired_before;
            !single_hit && !expired
        });

        let records_before = self.records.len();
        let live: HashSet<&str> = self.prism.values().map(|e| e.ssid.as_str()).collect();
        self.records.retain(|ssid, _| live.contains(ssid.as_str()));

        SweepReport {
            changing: changing_before - self.changing.len(),
            prism: prism_before - self.prism.len(),
            records: records_before - self.records.len(),
        }
    }
}

/// Sizes of the session tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Live public tokens.
    pub tokens: usize,
    /// Live session records.
    pub sessions: usize,
    /// Tokens in their rotation grace window.
    pub rotating: usize,
}

struct StoreInner {
    config: Arc<YusefConfig>,
    clock: Arc<dyn Clock>,
    nonces: NonceManager,
    tables: Mutex<SessionTables>,
}

/// Owner of every session table.
///
/// Cloning is cheap and every clone shares the same tables. One mutex guards
/// all three tables because a sweep cross-references them; it is never held
/// while handler code runs.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store measuring time with the system clock.
    pub fn new(config: Arc<YusefConfig>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with a custom time source.
    pub fn with_clock(config: Arc<YusefConfig>, clock: Arc<dyn Clock>) -> Self {
        let nonces = NonceManager::new(config.app_identity.clone(), config.max_nonces);
        Self {
            inner: Arc::new(StoreInner {
                config,
                clock,
                nonces,
                tables: Mutex::new(SessionTables::default()),
            }),
        }
    }

    pub fn config(&self) -> &YusefConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    fn tables(&self) -> MutexGuard<'_, SessionTables> {
        // A panicking handler must not wedge every later request.
        self.inner
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn rotates(&self, request: &Request) -> bool {
        match self.inner.config.rotation {
            RotationPolicy::Never => false,
            RotationPolicy::AnyPost => request.has_body(),
            RotationPolicy::ActionPost => request.body_item(ACTION_FIELD).is_some(),
        }
    }

    /// Map the connection to its internal session id, creating or rotating
    /// the public token as needed.
    ///
    /// Sets the session cookie on the response and binds the session to the
    /// connection. May answer with a `302` redirect (closing the connection)
    /// when the session had to be created. A connection that was already
    /// resolved returns its cached id untouched. Never fails: in the worst
    /// case a fresh session is produced.
    pub fn resolve(&self, conn: &mut Connection) -> String {
        if let Some(ssid) = conn.session_id() {
            return ssid.to_string();
        }

        let config = &self.inner.config;
        let now = self.inner.clock.now_millis();
        let user_agent = conn.request.user_agent().to_string();
        let ip = ip_chain(&conn.request);
        let name = cookie_name(&config.app_identity, &ip, &user_agent);
        let presented = conn
            .request
            .cookie(&name)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let mut causes = Vec::new();
        let mut retired: Option<String> = None;
        let mut carried: Option<(String, u64)> = None;
        let mut token = presented.clone();

        let mut tables = self.tables();

        // A rotation still in its grace window leads to the new token.
        if let Some(current) = &token
            && let Some(change) = tables.changing.get(current)
            && change.when >= now.saturating_sub(config.session_change_ttl_ms)
        {
            debug!(from = %current, to = %change.new_token, "following rotated session token");
            token = Some(change.new_token.clone());
        }

        // Unknown tokens are replaced; parallel requests carrying the same
        // token converge on the replacement.
        if let Some(current) = &token
            && !tables.prism.contains_key(current)
        {
            debug!(token = %current, "unknown session token");
            retired = Some(current.clone());
            token = None;
        }

        // Known token presented by another client or idle too long.
        if let Some(current) = token.clone() {
            let entry = &tables.prism[&current];
            let cause = if entry.ip != ip {
                Some(RedirectCause::IpConflict)
            } else if entry.user_agent != user_agent {
                Some(RedirectCause::UaConflict)
            } else if entry.last_seen < now.saturating_sub(config.session_ttl_ms) {
                Some(RedirectCause::Expired)
            } else {
                None
            };
            if let Some(cause) = cause {
                warn!(
                    token = %current,
                    %cause,
                    expected_ip = %entry.ip,
                    ip = %ip,
                    "resetting session token"
                );
                tables.invalidate(&current);
                causes.push(cause);
                token = None;
            }
        }

        // Valid token on a state changing request: keep the session, replace
        // the token.
        if let Some(current) = token.clone()
            && self.rotates(&conn.request)
            && let Some(entry) = tables.prism.remove(&current)
        {
            debug!(token = %current, "rotating session token before processing posted data");
            carried = Some((entry.ssid, entry.hit_count));
            retired = Some(current);
            token = None;
        }

        let existing = token.and_then(|current| {
            let entry = tables.prism.get_mut(&current)?;
            entry.last_seen = now;
            entry.hit_count += 1;
            Some((current, entry.ssid.clone()))
        });

        let (token, ssid) = match existing {
            Some(found) => found,
            None => {
                let fresh = tables.unused_token();
                // A rotated token inherits the hits of the one it replaces so
                // the single-hit sweep only ever catches first visits.
                let (ssid, hit_count) = match carried {
                    Some((ssid, hits)) => (ssid, hits + 1),
                    None => (tables.create_record(), 1),
                };
                tables.prism.insert(
                    fresh.clone(),
                    PrismEntry {
                        ip: ip.clone(),
                        user_agent: user_agent.clone(),
                        ssid: ssid.clone(),
                        last_seen: now,
                        hit_count,
                    },
                );
                (fresh, ssid)
            }
        };

        if let Some(old) = retired {
            tables.flag_changing(&old, &token, now);
        }

        if presented.is_none() && conn.request.query_item(NO_COOKIE_ARGUMENT).is_none() {
            causes.push(RedirectCause::NoCookie);
        }

        let swept = tables.sweep(now, config.session_ttl_ms, config.session_change_ttl_ms);
        if !swept.is_empty() {
            debug!(?swept, "swept session tables");
        }
        drop(tables);

        debug!(
            cookie = %name,
            before = presented.as_deref().unwrap_or(""),
            after = %token,
            "resolved session"
        );

        conn.response.set_cookie(name, token);
        conn.bind_session(ssid.clone(), self.clone());

        if config.redirect_on_new_session
            && !causes.is_empty()
            && conn
                .request
                .query_item(&config.session_redirect_argument)
                .is_none()
        {
            let causes: Vec<&str> = causes.iter().map(RedirectCause::as_str).collect();
            let location = redirect_location(
                &conn.request.uri,
                &config.session_redirect_argument,
                &causes.join(","),
            );
            debug!(%location, "redirecting to confirm session cookie");
            conn.response.redirect(location);
        }

        ssid
    }

    /// Resolve the session, validate the posted nonce, issue a fresh one and
    /// attach the result to the connection.
    pub fn setup(&self, conn: &mut Connection) -> SessionContext {
        let ssid = self.resolve(conn);
        let presented = conn.request.body_item(NONCE_FIELD).map(str::to_string);

        let context = {
            let mut tables = self.tables();
            let record = tables.records.entry(ssid.clone()).or_default();
            record.begin_request();
            if let Some(presented) = &presented {
                self.inner.nonces.validate(record, presented);
            }
            let nonce = self.inner.nonces.issue(record, &ssid, &conn.request.uri);
            SessionContext {
                id: ssid,
                nonce,
                is_valid_nonce: record.is_valid_nonce,
                previous_nonce: record.previous_nonce.clone(),
            }
        };

        debug!(
            uri = %conn.request.uri,
            is_valid_nonce = context.is_valid_nonce,
            "session set up"
        );
        conn.set_session(context.clone());
        context
    }

    /// Issue a nonce for a session outside of request dispatch.
    pub fn issue_nonce(&self, ssid: &str, uri: &str) -> Option<String> {
        let mut tables = self.tables();
        let record = tables.records.get_mut(ssid)?;
        Some(self.inner.nonces.issue(record, ssid, uri))
    }

    /// Consume a nonce of a session outside of request dispatch.
    pub fn validate_nonce(&self, ssid: &str, presented: &str) -> bool {
        let mut tables = self.tables();
        match tables.records.get_mut(ssid) {
            Some(record) => self.inner.nonces.validate(record, presented),
            None => false,
        }
    }

    /// Number of live nonces of a session.
    pub fn nonce_count(&self, ssid: &str) -> Option<usize> {
        self.tables().records.get(ssid).map(SessionRecord::nonce_count)
    }

    /// Whether a session record exists.
    pub fn contains_session(&self, ssid: &str) -> bool {
        self.tables().records.contains_key(ssid)
    }

    /// Copy of a session variable.
    pub fn variable(&self, ssid: &str, key: &str) -> Option<Value> {
        self.tables().records.get(ssid)?.storage.get(key).cloned()
    }

    /// Store a session variable. Returns `false` if the session is gone.
    pub fn set_variable(&self, ssid: &str, key: &str, value: Value) -> bool {
        match self.tables().records.get_mut(ssid) {
            Some(record) => {
                record.storage.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Remove a session variable. Returns `false` if the session is gone.
    pub fn delete_variable(&self, ssid: &str, key: &str) -> bool {
        match self.tables().records.get_mut(ssid) {
            Some(record) => {
                record.storage.remove(key);
                true
            }
            None => false,
        }
    }

    /// Drop stale rotations, single-hit tokens, tokens idle for twice the
    /// session TTL, and records no token points to.
    pub fn sweep(&self) -> SweepReport {
        let now = self.inner.clock.now_millis();
        let config = &self.inner.config;
        let report =
            self.tables()
                .sweep(now, config.session_ttl_ms, config.session_change_ttl_ms);
        if !report.is_empty() {
            debug!(?report, "swept session tables");
        }
        report
    }

    /// Drop every session.
    pub fn shutdown(&self) {
        let mut tables = self.tables();
        info!(
            tokens = tables.prism.len(),
            sessions = tables.records.len(),
            "shutting down session store"
        );
        *tables = SessionTables::default();
    }

    pub fn stats(&self) -> SessionStats {
        let tables = self.tables();
        SessionStats {
            tokens: tables.prism.len(),
            sessions: tables.records.len(),
            rotating: tables.changing.len(),
        }
    }
}

/// `uri` with `argument=value` appended to its query string.
fn redirect_location(uri: &str, argument: &str, value: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    let pair: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(argument, value)
        .finish();
    format!("{uri}{separator}{pair}")
}
