use super::*;

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_settings_path(tag: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("view_core_{tag}_{suffix}.toml"))
}

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn missing_file_yields_defaults() {
    let settings = load_settings_from(&temp_settings_path("missing"), no_env);
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn file_values_override_defaults() {
    let path = temp_settings_path("file");
    fs::write(
        &path,
        r#"
server_url = "https://erp.example.com"
summary_method = "custom.api.get_session_summary"
request_timeout_secs = 30
"#,
    )
    .expect("write settings");

    let settings = load_settings_from(&path, no_env);
    assert_eq!(settings.server_url, "https://erp.example.com");
    assert_eq!(settings.summary_method, "custom.api.get_session_summary");
    assert_eq!(settings.context_method, ClientSettings::default().context_method);
    assert_eq!(settings.request_timeout_secs, 30);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn env_overrides_file_and_prefixed_names_win() {
    let path = temp_settings_path("env");
    fs::write(&path, "server_url = \"https://from-file\"\n").expect("write settings");

    let vars: HashMap<&str, &str> = HashMap::from([
        ("SERVER_URL", "https://plain"),
        ("APP__SERVER_URL", "https://prefixed"),
        ("APP__API_TOKEN", "key:secret"),
        ("APP__REQUEST_TIMEOUT_SECS", "not-a-number"),
    ]);
    let settings = load_settings_from(&path, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_url, "https://prefixed");
    assert_eq!(settings.api_token.as_deref(), Some("key:secret"));
    assert_eq!(settings.request_timeout_secs, 15);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn unreadable_file_is_ignored() {
    let path = temp_settings_path("broken");
    fs::write(&path, "server_url = [").expect("write settings");

    let settings = load_settings_from(&path, no_env);
    assert_eq!(settings.server_url, ClientSettings::default().server_url);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn zero_timeout_is_clamped() {
    let settings = ClientSettings {
        request_timeout_secs: 0,
        ..ClientSettings::default()
    };
    assert_eq!(settings.request_timeout(), Duration::from_secs(1));
}
