use krakenhashes_config::{load_config, load_from_file, validate_config, KrakenConfig};
use std::fs;

fn temp_config_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(name);
    fs::create_dir_all(&dir).expect("failed to create temp config dir");
    dir
}

#[test]
fn load_from_file_reads_overridden_sections() {
    let dir = temp_config_dir("krakenhashes_test_config_file");
    let config_file = dir.join("config.toml");
    let content = r#"
[server]
bind_address = "127.0.0.1:9000"

[scheduling]
default_chunk_duration_secs = 900
chunk_fluctuation_percentage = 5
"#;
    fs::write(&config_file, content).expect("failed to write config file");

    let config = load_from_file(&config_file).expect("failed to load config");

    assert_eq!(config.server.bind_address, "127.0.0.1:9000");
    assert_eq!(config.scheduling.default_chunk_duration_secs, 900);
    assert_eq!(config.scheduling.chunk_fluctuation_percentage, 5);
    // Untouched fields keep their defaults.
    assert_eq!(config.scheduling.max_chunk_retry_attempts, 3);

    fs::remove_file(&config_file).ok();
    fs::remove_dir(&dir).ok();
}

#[test]
fn env_override_wins_over_file_and_default() {
    let dir = temp_config_dir("krakenhashes_test_config_env");
    let config_file = dir.join("config.toml");
    fs::write(
        &config_file,
        "[scheduling]\ndefault_chunk_duration_secs = 900\n",
    )
    .expect("failed to write config file");

    std::env::set_var("KRAKENHASHES_CONFIG", &config_file);
    std::env::set_var("KRAKEN_SCHEDULING_DEFAULT_CHUNK_DURATION_SECS", "1200");

    let config = load_config().expect("failed to load config");
    assert_eq!(config.scheduling.default_chunk_duration_secs, 1200);

    std::env::remove_var("KRAKENHASHES_CONFIG");
    std::env::remove_var("KRAKEN_SCHEDULING_DEFAULT_CHUNK_DURATION_SECS");
    fs::remove_file(&config_file).ok();
    fs::remove_dir(&dir).ok();
}

#[test]
fn defaults_are_used_when_no_file_present() {
    let dir = temp_config_dir("krakenhashes_test_config_missing");
    let config_file = dir.join("does-not-exist.toml");
    std::env::set_var("KRAKENHASHES_CONFIG", &config_file);

    let config = load_config().expect("should fall back to defaults");
    assert_eq!(config.scheduling.default_chunk_duration_secs, 600);
    assert_eq!(config.command_plane.ping_period_secs, 54);

    std::env::remove_var("KRAKENHASHES_CONFIG");
    fs::remove_dir(&dir).ok();
}

#[test]
fn rejects_malformed_toml() {
    let dir = temp_config_dir("krakenhashes_test_config_parse_error");
    let config_file = dir.join("config.toml");
    fs::write(&config_file, "this is not valid toml : :\n").expect("failed to write config file");

    let result = load_from_file(&config_file);
    assert!(result.is_err());

    fs::remove_file(&config_file).ok();
    fs::remove_dir(&dir).ok();
}

#[test]
fn validate_rejects_pong_wait_not_exceeding_ping_period() {
    let mut config = KrakenConfig::default();
    config.command_plane.ping_period_secs = 60;
    config.command_plane.pong_wait_secs = 60;

    let result = validate_config(&config);
    assert!(result.is_err());
}

#[test]
fn validate_rejects_non_positive_chunk_duration() {
    let mut config = KrakenConfig::default();
    config.scheduling.default_chunk_duration_secs = 0;

    let result = validate_config(&config);
    assert!(result.is_err());
}

#[test]
fn validate_accepts_default_config() {
    let config = KrakenConfig::default();
    assert!(validate_config(&config).is_ok());
}
