//! Cache location and environment configuration across platforms

use ocspcheck::{cache_file_path, default_cache_dir, platform_name, resolve_cache_dir, OcspConfig};
use std::env;
use std::time::Duration;

#[test]
fn test_default_cache_dir_is_platform_specific() {
    let Some(dir) = default_cache_dir() else {
        // No home directory in this environment.
        return;
    };

    #[cfg(target_os = "windows")]
    assert!(dir.ends_with(std::path::Path::new("Snowflake").join("Caches")));

    #[cfg(target_os = "macos")]
    assert!(dir.ends_with("Snowflake"));

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    assert!(dir.ends_with("snowflake"));
}

#[test]
fn test_explicit_cache_dir_wins() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(resolve_cache_dir(Some(dir.path())), Some(dir.path().to_path_buf()));
    assert_eq!(
        cache_file_path(Some(dir.path())),
        Some(dir.path().join("ocsp_response_validation_cache.bin"))
    );
}

#[test]
fn test_platform_name() {
    assert!(!platform_name().is_empty());
}

// Every environment-dependent assertion lives in this one test so parallel
// tests never observe a half-applied environment.
#[test]
fn test_environment_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let vars = [
        ("SF_OCSP_RESPONSE_CACHE_DIR", dir.path().display().to_string()),
        ("SF_OCSP_ACTIVATE_NEW_ENDPOINT", "true".to_string()),
        ("SF_OCSP_RESPONSE_CACHE_SERVER_ENABLED", "false".to_string()),
        ("SF_OCSP_USE_POST_METHOD", "1".to_string()),
        ("SF_OCSP_FAIL_OPEN", "false".to_string()),
        ("SF_TEST_OCSP_URL", "http://localhost:12345/ocsp".to_string()),
        ("SF_TEST_OCSP_FORCE_BAD_RESPONSE_VALIDITY", "true".to_string()),
        ("SF_TEST_CA_OCSP_RESPONDER_CONNECTION_TIMEOUT", "5".to_string()),
    ];
    for (name, value) in &vars {
        env::set_var(name, value);
    }

    // The cache location follows the environment on every call.
    assert_eq!(resolve_cache_dir(None), Some(dir.path().to_path_buf()));

    let config = OcspConfig::from_env();
    assert!(config.new_endpoint);
    assert!(!config.use_cache_server);
    assert!(config.use_post_method);
    assert!(!config.fail_open);
    assert_eq!(config.cache_dir.as_deref(), Some(dir.path()));
    // Test hooks stay off until test mode is enabled.
    assert!(config.test_overrides.is_empty());

    env::set_var("SF_OCSP_TEST_MODE", "true");
    let config = OcspConfig::from_env();
    assert!(config.test_overrides.force_bad_response_validity);
    assert_eq!(
        config.test_overrides.ocsp_responder_url.as_deref(),
        Some("http://localhost:12345/ocsp")
    );
    assert_eq!(config.effective_responder_timeout(), Duration::from_secs(5));

    // Unparseable values leave the defaults alone.
    env::set_var("SF_OCSP_FAIL_OPEN", "perhaps");
    assert!(OcspConfig::from_env().fail_open);

    env::remove_var("SF_OCSP_TEST_MODE");
    for (name, _) in &vars {
        env::remove_var(name);
    }
    assert_ne!(resolve_cache_dir(None), Some(dir.path().to_path_buf()));
}
