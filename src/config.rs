//! Validator configuration and environment loading.

use crate::endpoint::{top_level_domain_of, DEFAULT_TOP_LEVEL_DOMAIN};
use crate::identity::HashAlgorithm;
use crate::retry::RetryConfig;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CACHE_DIR: &str = crate::platform::CACHE_DIR_ENV;
pub const ENV_ACTIVATE_NEW_ENDPOINT: &str = "SF_OCSP_ACTIVATE_NEW_ENDPOINT";
pub const ENV_CACHE_SERVER_ENABLED: &str = "SF_OCSP_RESPONSE_CACHE_SERVER_ENABLED";
pub const ENV_CACHE_SERVER_URL: &str = "SF_OCSP_RESPONSE_CACHE_SERVER_URL";
pub const ENV_USE_POST_METHOD: &str = "SF_OCSP_USE_POST_METHOD";
pub const ENV_FAIL_OPEN: &str = "SF_OCSP_FAIL_OPEN";
pub const ENV_TEST_MODE: &str = "SF_OCSP_TEST_MODE";
pub const ENV_TEST_FORCE_BAD_RESPONSE_VALIDITY: &str = "SF_TEST_OCSP_FORCE_BAD_RESPONSE_VALIDITY";
pub const ENV_TEST_OCSP_URL: &str = "SF_TEST_OCSP_URL";
pub const ENV_TEST_RESPONDER_TIMEOUT: &str = "SF_TEST_CA_OCSP_RESPONDER_CONNECTION_TIMEOUT";

/// Hooks used by tests to force particular validator behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOverrides {
    /// Every response fails the thisUpdate/nextUpdate check.
    pub force_bad_response_validity: bool,
    /// Replaces the responder URL taken from the certificate.
    pub ocsp_responder_url: Option<String>,
    /// Replaces the responder fetch timeout.
    pub responder_timeout: Option<Duration>,
}

impl TestOverrides {
    pub fn is_empty(&self) -> bool {
        *self == TestOverrides::default()
    }
}

/// Configuration for an [`crate::OcspValidator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OcspConfig {
    /// Accept a chain when its revocation status cannot be determined.
    pub fail_open: bool,
    /// POST requests to the responder instead of GET.
    pub use_post_method: bool,
    /// Consult the cache server before the responder.
    pub use_cache_server: bool,
    /// Allow any network access. Without it a cache miss is an unknown status.
    pub use_network: bool,
    /// Route through the relay ("new endpoint") instead of the legacy cache server.
    pub new_endpoint: bool,
    /// Legacy cache server URL override.
    pub cache_server_url: Option<String>,
    pub top_level_domain: String,
    /// Hostname used by `validate_file`.
    pub hostname: Option<String>,
    pub cache_max_age: Duration,
    pub responder_timeout: Duration,
    pub cache_server_timeout: Duration,
    pub max_clock_skew: Duration,
    pub cert_id_hash: HashAlgorithm,
    pub retry: RetryConfig,
    /// Load and save the on-disk cache snapshot.
    pub persist_cache: bool,
    /// Cache directory override.
    pub cache_dir: Option<PathBuf>,
    pub test_overrides: TestOverrides,
}

impl Default for OcspConfig {
    fn default() -> Self {
        OcspConfig {
            fail_open: true,
            use_post_method: false,
            use_cache_server: true,
            use_network: true,
            new_endpoint: false,
            cache_server_url: None,
            top_level_domain: DEFAULT_TOP_LEVEL_DOMAIN.to_string(),
            hostname: None,
            cache_max_age: Duration::from_secs(24 * 60 * 60),
            responder_timeout: Duration::from_secs(10),
            cache_server_timeout: Duration::from_secs(5),
            max_clock_skew: Duration::from_secs(15 * 60),
            cert_id_hash: HashAlgorithm::Sha1,
            retry: RetryConfig::default(),
            persist_cache: true,
            cache_dir: None,
            test_overrides: TestOverrides::default(),
        }
    }
}

/// Parse `true/false/1/0/yes/no`, case-insensitively.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    let parsed = parse_bool(&value);
    if parsed.is_none() {
        warn!("Ignoring {}={:?}: not a boolean", name, value);
    }
    parsed
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl OcspConfig {
    /// Defaults with the `SF_OCSP_*` environment applied.
    pub fn from_env() -> Self {
        let mut config = OcspConfig::default();
        config.apply_env();
        config
    }

    /// Apply the `SF_OCSP_*` variables on top of this configuration. The
    /// `SF_TEST_*` hooks are read only when `SF_OCSP_TEST_MODE` is true.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env_string(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = env_bool(ENV_ACTIVATE_NEW_ENDPOINT) {
            self.new_endpoint = value;
        }
        if let Some(value) = env_bool(ENV_CACHE_SERVER_ENABLED) {
            self.use_cache_server = value;
        }
        if let Some(url) = env_string(ENV_CACHE_SERVER_URL) {
            self.cache_server_url = Some(url);
        }
        if let Some(value) = env_bool(ENV_USE_POST_METHOD) {
            self.use_post_method = value;
        }
        if let Some(value) = env_bool(ENV_FAIL_OPEN) {
            self.fail_open = value;
        }

        if env_bool(ENV_TEST_MODE) != Some(true) {
            return;
        }
        if let Some(value) = env_bool(ENV_TEST_FORCE_BAD_RESPONSE_VALIDITY) {
            self.test_overrides.force_bad_response_validity = value;
        }
        if let Some(url) = env_string(ENV_TEST_OCSP_URL) {
            self.test_overrides.ocsp_responder_url = Some(url);
        }
        if let Some(value) = env_string(ENV_TEST_RESPONDER_TIMEOUT) {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.test_overrides.responder_timeout = Some(Duration::from_secs(secs)),
                Err(_) => warn!("Ignoring {}={:?}: not a number of seconds", ENV_TEST_RESPONDER_TIMEOUT, value),
            }
        }
    }

    /// Top-level domain for `hostname`, falling back to the configured one.
    pub fn top_level_domain_for(&self, hostname: &str) -> String {
        top_level_domain_of(&hostname.to_ascii_lowercase())
            .map(str::to_string)
            .unwrap_or_else(|| self.top_level_domain.clone())
    }

    /// Effective responder timeout, test override included.
    pub fn effective_responder_timeout(&self) -> Duration {
        self.test_overrides.responder_timeout.unwrap_or(self.responder_timeout)
    }
}
