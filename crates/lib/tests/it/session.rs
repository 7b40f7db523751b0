//! Session behaviour across requests.

use serde_json::Value;
use yusef::{RotationPolicy, SessionStats, YusefConfig};

use crate::helpers::{
    Browser, FIREFOX, SAFARI, echo_variable, test_config, test_dispatcher, text,
};

#[test]
fn browsing_keeps_one_session_and_token() {
    let (mut d, clock) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);

    let first = browser.get(&d, "/");
    let ssid = first.session_id().unwrap().to_string();
    let token = browser.token(&d).unwrap();

    for _ in 0..3 {
        clock.advance(10_000);
        let conn = browser.get(&d, "/");
        assert_eq!(conn.session_id(), Some(ssid.as_str()));
        assert_eq!(browser.token(&d).as_deref(), Some(token.as_str()));
    }
    assert_eq!(
        d.sessions().stats(),
        SessionStats {
            tokens: 1,
            sessions: 1,
            rotating: 0
        }
    );
}

#[test]
fn parallel_tab_follows_rotation_within_grace_window() {
    let (mut d, clock) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/");
    let original = browser.token(&d).unwrap();

    let mut tab = Browser::new("203.0.113.5", FIREFOX);
    tab.set_token(&d, &original);

    let posted = browser.post(&d, "/", &[("comment", "hello")]);
    let rotated = browser.token(&d).unwrap();
    assert_ne!(rotated, original);

    // the other tab still sends the old token and lands on the new one
    clock.advance(1_000);
    let conn = tab.get(&d, "/");
    assert_eq!(conn.session_id(), posted.session_id());
    assert_eq!(tab.token(&d).as_deref(), Some(rotated.as_str()));
}

#[test]
fn retired_token_after_grace_window_starts_over() {
    let (mut d, clock) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/");
    let original = browser.token(&d).unwrap();
    let posted = browser.post(&d, "/", &[("comment", "hello")]);

    clock.advance(d.config().session_change_ttl_ms + 1_000);
    let mut stale = Browser::new("203.0.113.5", FIREFOX);
    stale.set_token(&d, &original);
    let conn = stale.get(&d, "/");

    assert_ne!(conn.session_id(), posted.session_id());
    assert_ne!(stale.token(&d).as_deref(), Some(original.as_str()));
}

#[test]
fn token_from_another_ip_is_reset() {
    let config = YusefConfig {
        redirect_on_new_session: true,
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();

    let mut victim = Browser::new("203.0.113.5", FIREFOX);
    victim.get(&d, "/?session-redirect=noCookie");
    let victim_ssid = victim.get(&d, "/").session_id().unwrap().to_string();
    let stolen = victim.token(&d).unwrap();

    let mut thief = Browser::new("198.51.100.66", FIREFOX);
    thief.set_token(&d, &stolen);
    let conn = thief.get(&d, "/");
    assert_eq!(conn.response.status(), 302);
    assert_eq!(
        conn.response.header("Location"),
        Some("/?session-redirect=ipConflict")
    );
    assert_ne!(conn.session_id(), Some(victim_ssid.as_str()));

    // the compromised session is gone for the victim as well
    let conn = victim.get(&d, "/");
    assert_eq!(conn.response.status(), 200);
    assert_ne!(conn.session_id(), Some(victim_ssid.as_str()));
}

#[test]
fn token_from_another_user_agent_is_reset() {
    let (mut d, _) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();

    let mut firefox = Browser::new("203.0.113.5", FIREFOX);
    let ssid = firefox.get(&d, "/").session_id().unwrap().to_string();

    let mut safari = Browser::new("203.0.113.5", SAFARI);
    safari.set_token(&d, &firefox.token(&d).unwrap());
    let conn = safari.get(&d, "/");

    assert_ne!(conn.session_id(), Some(ssid.as_str()));
    assert!(!d.sessions().contains_session(&ssid));
}

#[test]
fn idle_session_expires() {
    let config = YusefConfig {
        redirect_on_new_session: true,
        ..test_config()
    };
    let (mut d, clock) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    let ssid = browser
        .get(&d, "/?session-redirect=noCookie")
        .session_id()
        .unwrap()
        .to_string();

    clock.advance(d.config().session_ttl_ms + 1);
    let conn = browser.get(&d, "/");
    assert_eq!(
        conn.response.header("Location"),
        Some("/?session-redirect=expired")
    );
    assert_ne!(conn.session_id(), Some(ssid.as_str()));
}

#[test]
fn expiry_is_reported_when_other_clients_came_first() {
    let config = YusefConfig {
        redirect_on_new_session: true,
        ..test_config()
    };
    let (mut d, clock) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/?session-redirect=noCookie");
    let ssid = browser
        .get(&d, "/")
        .session_id()
        .unwrap()
        .to_string();

    clock.advance(d.config().session_ttl_ms + 1);
    let mut other = Browser::new("198.51.100.7", SAFARI);
    other.get(&d, "/?noCookie=1");

    let conn = browser.get(&d, "/");
    assert_eq!(
        conn.response.header("Location"),
        Some("/?session-redirect=expired")
    );
    assert!(!d.sessions().contains_session(&ssid));
}

#[test]
fn notes_survive_reading_time_after_a_post() {
    let (mut d, clock) = test_dispatcher(test_config());
    d.register_section("_index", echo_variable("note")).unwrap();
    d.register_action("note", |conn| {
        conn.set_session_variable("note", "milk");
        Ok(Value::Null)
    })
    .unwrap();

    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    let ssid = browser.get(&d, "/").session_id().unwrap().to_string();
    browser.submit(&d, "/", "note");

    clock.advance(10_000);
    d.sessions().sweep();
    let conn = browser.get(&d, "/");
    assert_eq!(conn.session_id(), Some(ssid.as_str()));
    assert_eq!(conn.response.body(), "\"milk\"");
}

#[test]
fn variables_survive_token_rotation() {
    let (mut d, _) = test_dispatcher(test_config());
    d.register_section("_index", echo_variable("visits")).unwrap();
    d.register_action("visit", |conn| {
        let visits = conn
            .session_variable("visits")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        conn.set_session_variable("visits", visits);
        Ok(Value::from(visits))
    })
    .unwrap();

    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    assert_eq!(browser.get(&d, "/").response.body(), "none");
    assert_eq!(browser.submit(&d, "/", "visit").response.body(), "1");
    assert_eq!(browser.submit(&d, "/", "visit").response.body(), "2");
    assert_eq!(browser.get(&d, "/").response.body(), "2");
}

#[test]
fn rotation_policy_never_keeps_token_on_post() {
    let config = YusefConfig {
        rotation: RotationPolicy::Never,
        ..test_config()
    };
    let (mut d, _) = test_dispatcher(config);
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    browser.get(&d, "/");
    let token = browser.token(&d).unwrap();

    browser.post(&d, "/", &[("comment", "hello")]);
    assert_eq!(browser.token(&d), Some(token));
    assert_eq!(d.sessions().stats().rotating, 0);
}

#[test]
fn sweep_drops_single_hit_clients() {
    let (mut d, clock) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();

    // cookie-less crawlers each leave one single-hit token behind
    for i in 0..5 {
        let mut crawler = Browser::new(&format!("192.0.2.{i}"), "crawler/1.0");
        crawler.get(&d, "/");
    }
    let mut regular = Browser::new("203.0.113.5", FIREFOX);
    regular.get(&d, "/");
    regular.get(&d, "/");
    assert_eq!(d.sessions().stats().tokens, 6);

    clock.advance(d.config().session_change_ttl_ms + 1);
    let report = d.sessions().sweep();
    assert_eq!(report.prism, 5);
    assert_eq!(report.records, 5);
    assert_eq!(
        d.sessions().stats(),
        SessionStats {
            tokens: 1,
            sessions: 1,
            rotating: 0
        }
    );
}

#[test]
fn shutdown_forgets_every_session() {
    let (mut d, _) = test_dispatcher(test_config());
    d.register_section("_index", text("home")).unwrap();
    let mut browser = Browser::new("203.0.113.5", FIREFOX);
    let ssid = browser.get(&d, "/").session_id().unwrap().to_string();

    d.sessions().shutdown();
    assert_eq!(d.sessions().stats(), SessionStats::default());

    let conn = browser.get(&d, "/");
    assert_ne!(conn.session_id(), Some(ssid.as_str()));
}
