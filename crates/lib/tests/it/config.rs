//! Loading configuration files.

use std::io::Write as _;

use yusef::{RotationPolicy, YusefConfig};

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn partial_file_keeps_defaults() {
    let file = config_file(
        r#"{
            "app_identity": "notes",
            "service_path": "/notes/",
            "rotation": "action_post"
        }"#,
    );
    let config = YusefConfig::from_file(file.path()).unwrap();

    assert_eq!(config.app_identity, "notes");
    assert_eq!(config.service_path, "/notes/");
    assert_eq!(config.rotation, RotationPolicy::ActionPost);
    assert_eq!(config.max_nonces, YusefConfig::default().max_nonces);
    assert!(config.redirect_on_new_session);
}

#[test]
fn malformed_file_is_a_config_error() {
    let file = config_file("{ not json");
    let err = YusefConfig::from_file(file.path()).unwrap_err();
    assert!(err.is_config_error());
    assert_eq!(err.module(), "config");
}

#[test]
fn invalid_values_are_rejected() {
    let file = config_file(r#"{ "service_path": "notes" }"#);
    let err = YusefConfig::from_file(file.path()).unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains("service_path"), "{err}");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = YusefConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(err.is_config_error());
}
