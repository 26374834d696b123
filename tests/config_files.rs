// tests/config_files.rs
use std::{env, fs};

use remote_sync_worker::config::{
    load_default, load_from, Preset, RemoteKind, ENV_BASE_URL, ENV_CONFIG_PATH, ENV_INTERVAL_MS,
    ENV_PRESET,
};
use remote_sync_worker::{FailurePolicy, FanOut};

fn clear_env() {
    for k in [ENV_CONFIG_PATH, ENV_PRESET, ENV_BASE_URL, ENV_INTERVAL_MS] {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn parse_toml_and_json_paths() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("worker.toml");
    fs::write(
        &p_toml,
        r#"
preset = "orders"

[batch]
mode = "parallel"
max_concurrency = 8
on_failure = "drain"

[poll]
interval_ms = 250
"#,
    )
    .unwrap();
    let cfg = load_from(&p_toml).unwrap();
    assert_eq!(cfg.preset, Some(Preset::Orders));
    assert_eq!(cfg.batch.filter.as_deref(), Some("total > 1000"));
    assert_eq!(
        cfg.batch.fan_out(),
        FanOut::Parallel {
            max_concurrency: Some(8),
            on_failure: FailurePolicy::Drain
        }
    );
    assert_eq!(cfg.poll.interval_ms, 250);

    let p_json = dir.path().join("worker.json");
    fs::write(
        &p_json,
        r#"{"remote": {"kind": "s3", "bucket": "b", "prefix": "logs/"},
            "batch": {"detail_paths": ["{id}"]}}"#,
    )
    .unwrap();
    let cfg = load_from(&p_json).unwrap();
    assert_eq!(cfg.remote.kind, RemoteKind::S3);
    assert_eq!(cfg.preset, None);
}

#[serial_test::serial]
#[test]
fn invalid_file_is_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("worker.toml");
    fs::write(&p, "[batch]\nfilter = \"total ~ 3\"\n").unwrap();
    assert!(load_from(&p).is_err());

    fs::write(&p, "preset = \"nope\"\n").unwrap();
    assert!(load_from(&p).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    clear_env();
    // isolate CWD so the repo's own config/ is not read
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    // 1) nothing at all -> built-in defaults
    let cfg = load_default().unwrap();
    assert_eq!(cfg.preset, None);
    assert_eq!(cfg.remote.collection, "orders");

    // 2) preset from env
    env::set_var(ENV_PRESET, "users");
    let cfg = load_default().unwrap();
    assert_eq!(cfg.remote.collection, "users");
    env::remove_var(ENV_PRESET);

    // 3) ./config/worker.toml fallback
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("worker.toml"), "preset = \"orders-unbounded\"\n").unwrap();
    let cfg = load_default().unwrap();
    assert_eq!(cfg.preset, Some(Preset::OrdersUnbounded));
    assert!(cfg.retry.retry_listing);

    // 4) explicit path wins, env overrides on top
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"{"preset": "s3-sweep"}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    env::set_var(ENV_BASE_URL, "http://minio.local:9000");
    env::set_var(ENV_INTERVAL_MS, "5000");
    let cfg = load_default().unwrap();
    assert_eq!(cfg.preset, Some(Preset::S3Sweep));
    assert_eq!(cfg.remote.base_url, "http://minio.local:9000");
    assert_eq!(cfg.poll.interval_ms, 5000);

    // 5) dangling path is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn non_numeric_interval_override_fails() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("worker.toml");
    fs::write(&p, "").unwrap();
    env::set_var(ENV_INTERVAL_MS, "soon");
    let res = load_from(&p);
    env::remove_var(ENV_INTERVAL_MS);
    assert!(res.is_err());
}
