//! Full request flows through the dispatcher.

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use yusef::{Error, Request, ResponseState, YusefConfig};

use crate::helpers::{Browser, FIREFOX, dispatch, test_config, test_dispatcher, text};

#[test]
fn form_post_runs_action_once() {
    let (mut d, _) = test_dispatcher(test_config());
    let runs = Arc::new(AtomicUsize::new(0));
    d.register_section("_index", |conn| {
        let notes = conn.session_variable("notes").unwrap_or(json!([]));
        Ok(Some(format!(
            "{}|{}",
            notes,
            conn.unite_action_data.clone().unwrap_or(Value::Null)
        )))
    })
    .unwrap();
    {
        let runs = runs.clone();
        d.register_action("add-note", move |conn| {
            runs.fetch_add(1, Ordering::SeqCst);
            let note = conn.request.body_item("note").unwrap_or("").to_string();
            let mut notes = conn.session_variable("notes").unwrap_or(json!([]));
            if let Some(list) = notes.as_array_mut() {
                list.push(Value::from(note));
            }
            conn.set_session_variable("notes", notes.clone());
            Ok(json!({ "added": true }))
        })
        .unwrap();
    }

    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/");
    let nonce = browser.nonce().unwrap().to_string();

    let conn = browser.post(
        &d,
        "/",
        &[
            ("unite-action", "add-note"),
            ("unite-nonce", nonce.as_str()),
            ("note", "buy milk"),
        ],
    );
    assert_eq!(conn.response.body(), r#"["buy milk"]|{"added":true}"#);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // resubmitting the same form is ignored
    let conn = browser.post(
        &d,
        "/",
        &[
            ("unite-action", "add-note"),
            ("unite-nonce", nonce.as_str()),
            ("note", "buy milk"),
        ],
    );
    assert_eq!(conn.response.body(), r#"["buy milk"]|null"#);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!conn.session().unwrap().is_valid_nonce);
}

#[test]
fn nonce_of_another_session_is_rejected() {
    let (mut d, _) = test_dispatcher(test_config());
    let runs = Arc::new(AtomicUsize::new(0));
    d.register_section("_index", text("home")).unwrap();
    {
        let runs = runs.clone();
        d.register_action("delete", move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .unwrap();
    }

    let mut victim = Browser::new("203.0.113.5", FIREFOX);
    victim.get(&d, "/");
    let victim_nonce = victim.nonce().unwrap().to_string();

    let mut attacker = Browser::new("198.51.100.66", FIREFOX);
    attacker.get(&d, "/");
    let conn = attacker.post(
        &d,
        "/",
        &[("unite-action", "delete"), ("unite-nonce", victim_nonce.as_str())],
    );
    assert!(!conn.session().unwrap().is_valid_nonce);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // the victim's nonce is still good
    victim.post(
        &d,
        "/",
        &[("unite-action", "delete"), ("unite-nonce", victim_nonce.as_str())],
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn oldest_nonce_is_evicted() {
    let config = YusefConfig {
        max_nonces: 2,
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);

    let mut nonces = Vec::new();
    for _ in 0..3 {
        browser.get(&d, "/");
        nonces.push(browser.nonce().unwrap().to_string());
    }

    let conn = browser.post(&d, "/", &[("unite-nonce", nonces[0].as_str())]);
    assert!(!conn.session().unwrap().is_valid_nonce);
    let conn = browser.post(&d, "/", &[("unite-nonce", nonces[2].as_str())]);
    assert!(conn.session().unwrap().is_valid_nonce);
    assert_eq!(conn.session().unwrap().previous_nonce.as_deref(), Some(nonces[2].as_str()));
}

#[test]
fn mounted_under_service_path() {
    let config = YusefConfig {
        service_path: "/app/".to_string(),
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    d.register_section("api", |conn| Ok(Some(conn.request.path.clone())))
        .unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);

    assert_eq!(browser.get(&d, "/app/").response.body(), "home");
    assert_eq!(browser.get(&d, "/app").response.body(), "home");
    assert_eq!(browser.get(&d, "/app/api/v1/items").response.body(), "/v1/items");

    let conn = browser.get(&d, "/app/unknown");
    assert_eq!(conn.response.status(), 404);
    assert!(conn.response.body().contains("href=\"/app/api\""));
}

#[test]
fn static_files_are_left_to_the_host() {
    let (d, _) = test_dispatcher(test_config());
    let conn = dispatch(&d, Request::get("/static/js/app.js"));

    assert_eq!(conn.response.state(), &ResponseState::Redispatched(None));
    assert!(conn.response.cookies().is_empty());
    assert_eq!(d.sessions().stats().tokens, 0);
}

#[test]
fn handler_can_serve_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "id,name").unwrap();
    let path = file.path().to_path_buf();

    let (mut d, _) = test_dispatcher(test_config());
    {
        let path = path.clone();
        d.register_section("export", move |conn| {
            conn.serve_file(path.clone(), Some("text/csv"));
            Ok(None)
        })
        .unwrap();
    }

    let conn = dispatch(&d, Request::get("/export"));
    assert_eq!(conn.response.state(), &ResponseState::Redispatched(Some(path)));
    assert_eq!(conn.response.header("Content-Type"), Some("text/csv"));
    // sessions still apply to handler-served files
    assert!(conn.session().is_some());
}

#[test]
fn failing_handlers_are_isolated() {
    let (mut d, _) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();
    d.register_section("broken", |_| Err(Error::handler("template missing")))
        .unwrap();
    d.register_section("panics", |_| {
        let items: Vec<u32> = Vec::new();
        Ok(Some(items[3].to_string()))
    })
    .unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);

    assert_eq!(browser.get(&d, "/broken").response.status(), 500);
    assert_eq!(browser.get(&d, "/panics").response.status(), 500);
    let conn = browser.get(&d, "/");
    assert_eq!(conn.response.status(), 200);
    assert_eq!(conn.response.body(), "home");
}

#[test]
fn failing_action_skips_section_handler() {
    let (mut d, _) = test_dispatcher(test_config());
    let rendered = Arc::new(AtomicUsize::new(0));
    {
        let rendered = rendered.clone();
        d.register_section("_index", move |_| {
            rendered.fetch_add(1, Ordering::SeqCst);
            Ok(Some("home".to_string()))
        })
        .unwrap();
    }
    d.register_action("explode", |_| Err(Error::handler("no such record")))
        .unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/");

    let conn = browser.submit(&d, "/", "explode");
    assert_eq!(conn.response.status(), 500);
    assert_eq!(rendered.load(Ordering::SeqCst), 1);
}

#[test]
fn first_contact_redirect_round_trip() {
    let config = YusefConfig {
        redirect_on_new_session: true,
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);

    let conn = browser.get(&d, "/?lang=en");
    assert_eq!(conn.response.status(), 302);
    let location = conn.response.header("Location").unwrap().to_string();
    assert_eq!(location, "/?lang=en&session-redirect=noCookie");
    assert!(browser.token(&d).is_some());

    let conn = browser.get(&d, &location);
    assert_eq!(conn.response.status(), 200);
    assert_eq!(conn.response.body(), "home");
}

#[test]
fn opting_out_of_cookies_skips_redirect() {
    let config = YusefConfig {
        redirect_on_new_session: true,
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();

    let conn = dispatch(&d, Request::get("/?noCookie=1"));
    assert_eq!(conn.response.status(), 200);
    assert_eq!(conn.response.body(), "home");
}
