//! The demo application: a per-session notes page and a small JSON API.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;
use yusef::{
    Connection, Dispatcher, Error, Next, RequestInfo, Result, SessionStore, Timing, YusefConfig,
};

use crate::templates::{IndexView, index_page};

const NOTES: &str = "notes";
const VISITS: &str = "visits";
const MAX_NOTES: usize = 20;
const MAX_NOTE_LEN: usize = 200;

/// Build the dispatcher serving the demo application.
pub fn build(config: YusefConfig) -> Result<Dispatcher> {
    let config = Arc::new(config);
    let sessions = SessionStore::new(config.clone());
    let mut dispatcher = Dispatcher::new(config.clone(), sessions.clone());

    dispatcher.add_middleware(Timing);
    dispatcher.add_middleware(security_headers);

    {
        let config = config.clone();
        dispatcher.register_section("_index", move |conn| index(&config, conn))?;
    }
    {
        let config = config.clone();
        dispatcher.register_section("api", move |conn| api(&config, &sessions, conn))?;
    }
    dispatcher.register_action("add-note", add_note)?;
    dispatcher.register_action("clear-notes", clear_notes)?;

    info!(
        service_path = %config.service_path,
        sections = ?dispatcher.sections().names().collect::<Vec<_>>(),
        "demo application ready"
    );
    Ok(dispatcher)
}

fn security_headers(conn: &mut Connection, next: Next<'_>) -> Result<Option<String>> {
    conn.response.set_header("X-Content-Type-Options", "nosniff");
    conn.response.set_header("X-Frame-Options", "DENY");
    next.run(conn)
}

fn notes_of(conn: &Connection) -> Vec<String> {
    conn.session_variable(NOTES)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn index(config: &YusefConfig, conn: &mut Connection) -> Result<Option<String>> {
    let visits = conn
        .session_variable(VISITS)
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
        + 1;
    conn.set_session_variable(VISITS, visits);

    let info = RequestInfo::new(config, conn);
    let notes = notes_of(conn);
    conn.response
        .set_header("Content-Type", "text/html; charset=utf-8");
    Ok(Some(index_page(&IndexView {
        info: &info,
        visits,
        notes: &notes,
    })))
}

fn api(config: &YusefConfig, sessions: &SessionStore, conn: &mut Connection) -> Result<Option<String>> {
    conn.response
        .set_header("Content-Type", "application/json");
    let body = match conn.request.path.as_str() {
        "/info" => serde_json::to_value(RequestInfo::new(config, conn))?,
        "/notes" => json!({ "notes": notes_of(conn) }),
        "/sessions" if conn.is_owner => serde_json::to_value(sessions.stats())?,
        "/sessions" => {
            conn.response.set_status(403);
            json!({ "error": "only available to the server owner" })
        }
        other => {
            conn.response.set_status(404);
            json!({ "error": format!("unknown endpoint {other}") })
        }
    };
    Ok(Some(body.to_string()))
}

fn add_note(conn: &mut Connection) -> Result<Value> {
    let note = conn.request.body_item("note").unwrap_or("").trim().to_string();
    if note.is_empty() {
        return Ok(json!({ "added": false, "reason": "empty note" }));
    }
    if note.chars().count() > MAX_NOTE_LEN {
        return Ok(json!({ "added": false, "reason": "note too long" }));
    }

    let mut notes = notes_of(conn);
    notes.push(note.clone());
    if notes.len() > MAX_NOTES {
        notes.remove(0);
    }
    if !conn.set_session_variable(NOTES, serde_json::to_value(&notes)?) {
        return Err(Error::handler("no session to store the note in"));
    }
    Ok(json!({ "added": true, "note": note, "count": notes.len() }))
}

fn clear_notes(conn: &mut Connection) -> Result<Value> {
    let cleared = notes_of(conn).len();
    conn.delete_session_variable(NOTES);
    Ok(json!({ "cleared": cleared }))
}
