use super::*;

use std::fs;

fn env(vars: &[(&str, &str)]) -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true).source(Some(
        vars.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    ))
}

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("drab-agent-{}-{name}.toml", std::process::id()));
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn defaults_apply_without_file_or_environment() {
    let settings = load_settings_with_env(None, env(&[])).expect("settings");
    assert_eq!(settings, AgentSettings::default());
    assert_eq!(settings.retry_max_attempts, 5);
    assert_eq!(settings.heartbeat_interval_ms, 30_000);
}

#[test]
fn file_values_override_defaults() {
    let path = write_config(
        "file",
        r#"
        endpoint = "wss://controller.test/drab/socket"
        path = "/orders"
        retry_max_attempts = 2
        "#,
    );
    let settings = load_settings_with_env(Some(&path), env(&[])).expect("settings");
    fs::remove_file(&path).ok();

    assert_eq!(settings.endpoint, "wss://controller.test/drab/socket");
    assert_eq!(settings.path, "/orders");
    assert_eq!(settings.retry_max_attempts, 2);
    assert_eq!(settings.reply_timeout_ms, 10_000);
}

#[test]
fn environment_overrides_file() {
    let path = write_config("env", "path = \"/from-file\"\ntoken = \"file-token\"\n");
    let settings = load_settings_with_env(
        Some(&path),
        env(&[
            ("DRAB_AGENT_PATH", "/from-env"),
            ("DRAB_AGENT_RETRY_BASE_DELAY_MS", "250"),
        ]),
    )
    .expect("settings");
    fs::remove_file(&path).ok();

    assert_eq!(settings.path, "/from-env");
    assert_eq!(settings.token.as_deref(), Some("file-token"));
    assert_eq!(settings.retry_base_delay_ms, 250);
}

#[test]
fn explicit_config_file_must_exist() {
    let missing = std::env::temp_dir().join("drab-agent-does-not-exist.toml");
    assert!(load_settings_with_env(Some(&missing), env(&[])).is_err());
}

#[test]
fn settings_map_onto_transport_and_session() {
    let settings = AgentSettings {
        endpoint: "ws://localhost:4000/drab/socket".into(),
        token: Some("abc".into()),
        path: "/cart".into(),
        return_mode: "r1".into(),
        reply_timeout_ms: 1_500,
        retry_max_attempts: 3,
        retry_base_delay_ms: 100,
        retry_max_delay_ms: 800,
        ..AgentSettings::default()
    };

    let phoenix = settings.phoenix_config().expect("endpoint");
    assert_eq!(
        phoenix.socket_url().as_str(),
        "ws://localhost:4000/drab/socket/websocket?token=abc&vsn=2.0.0"
    );
    assert_eq!(phoenix.reply_timeout, Duration::from_millis(1_500));

    let session = settings.session_config();
    assert_eq!(session.path, "/cart");
    assert_eq!(session.return_mode, "r1");
    assert_eq!(
        session.retry,
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(800),
        }
    );

    let broken = AgentSettings {
        endpoint: "not a url".into(),
        ..AgentSettings::default()
    };
    assert!(broken.phoenix_config().is_err());
}
