use std::path::PathBuf;

use duet::models::{DuetConfig, Framework, MarketDataPayload, Placement};

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/duet.toml")
}

#[test]
fn sample_config_matches_defaults() {
    let loaded = duet::load_config(sample_config()).unwrap();
    assert_eq!(loaded, DuetConfig::default());
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[memory]\ndays_to_keep = 0\n").unwrap();
    let err = duet::load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("days_to_keep"));
}

#[test]
fn missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(duet::load_config(dir.path().join("absent.toml")).is_err());
}

#[test]
fn shared_instance_is_built_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DuetConfig::default();
    config.memory.sqlite_path = dir.path().join("shared.db").display().to_string();
    config.redis.enabled = false;

    assert!(duet::shared().is_none());
    let first = duet::init_shared(&config).unwrap();
    first
        .save_market_data(
            "EURUSD",
            "bar",
            MarketDataPayload::close(1.0),
            Framework::Trading,
            Placement::Both,
        )
        .unwrap();

    let mut other = config.clone();
    other.memory.namespace = "ignored".into();
    let second = duet::init_shared(&other).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(second.config().namespace, "duet_shared");
    assert!(duet::shared().is_some());
}
