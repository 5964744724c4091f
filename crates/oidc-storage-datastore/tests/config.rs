use std::time::Duration;
use std::{env, fs};

use oidc_storage_datastore::DatastoreConfig;
use oidc_storage_datastore::config::{ConfigError, DEFAULT_ENDPOINT, PROJECT_ID_ENV};

#[test]
fn config_file_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("datastore.toml");

    fs::write(
        &path,
        r#"
project_id = "from-file"
kind_prefix = "dex_"
namespace = "tenant-a"
request_timeout = "10s"
"#,
    )
    .expect("write toml");

    // 1) File values are picked up, the rest default
    let cfg = DatastoreConfig::load(Some(path.as_path())).expect("should parse config");
    if env::var(PROJECT_ID_ENV).is_err() {
        assert_eq!(cfg.project_id, "from-file");
    }
    assert_eq!(cfg.namespace, "tenant-a");
    assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);

    // 2) Env overrides win over the file
    unsafe {
        env::set_var("DATASTORE_KIND_PREFIX", "from_env_");
        env::set_var("DATASTORE_REQUEST_TIMEOUT", "2m");
    }
    let cfg_env = DatastoreConfig::load(Some(path.as_path())).expect("should parse config with env");
    assert_eq!(cfg_env.kind_prefix, "from_env_");
    assert_eq!(cfg_env.request_timeout, Duration::from_secs(120));
    unsafe {
        env::remove_var("DATASTORE_KIND_PREFIX");
        env::remove_var("DATASTORE_REQUEST_TIMEOUT");
    }

    // 3) Invalid values are rejected
    let bad = dir.path().join("bad.toml");
    fs::write(
        &bad,
        r#"
project_id = "demo"
endpoint = "not a url"
"#,
    )
    .expect("write bad toml");
    if env::var("DATASTORE_EMULATOR_HOST").is_err() {
        match DatastoreConfig::load(Some(bad.as_path())) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("not a url")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    // 4) A missing file falls back to the environment alone
    let missing = dir.path().join("missing.toml");
    if env::var(PROJECT_ID_ENV).is_err() {
        assert!(DatastoreConfig::load(Some(missing.as_path())).is_err());
    }
}
