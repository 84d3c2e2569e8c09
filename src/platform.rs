//! Platform-specific locations: the response cache directory and the system
//! certificate stores.
//!
//! Nothing here is memoized; every call reads the environment again so a
//! redirected cache directory takes effect immediately.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "SF_OCSP_RESPONSE_CACHE_DIR";

/// File name of the persisted validation cache inside the cache directory.
pub const CACHE_FILE_NAME: &str = "ocsp_response_validation_cache.bin";

/// Per-platform default cache directory, without any override applied.
///
/// `~/.cache/snowflake` on Linux and other Unixes,
/// `~/Library/Caches/Snowflake` on macOS and
/// `%LOCALAPPDATA%\Snowflake\Caches` on Windows.
pub fn default_cache_dir() -> Option<PathBuf> {
    let base = dirs::cache_dir()?;

    #[cfg(target_os = "windows")]
    {
        Some(base.join("Snowflake").join("Caches"))
    }

    #[cfg(target_os = "macos")]
    {
        Some(base.join("Snowflake"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Some(base.join("snowflake"))
    }
}

/// Resolve the cache directory: explicit override, then the environment
/// variable, then the platform default.
pub fn resolve_cache_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }
    match env::var_os(CACHE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => default_cache_dir(),
    }
}

/// Full path of the cache file, or `None` when no directory can be determined.
pub fn cache_file_path(explicit_dir: Option<&Path>) -> Option<PathBuf> {
    resolve_cache_dir(explicit_dir).map(|dir| dir.join(CACHE_FILE_NAME))
}

/// Get the system's certificate store location based on the platform.
///
/// Returns common certificate store paths for each operating system.
pub fn get_system_cert_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = vec![PathBuf::from(r"C:\ProgramData\SSL\certs")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".ssl").join("certs"));
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/etc/ssl/certs"),
            PathBuf::from("/etc/ssl/cert.pem"),
            PathBuf::from("/usr/local/etc/openssl/certs"),
            PathBuf::from("/opt/homebrew/etc/openssl@3/cert.pem"),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        let mut paths = vec![
            PathBuf::from("/etc/ssl/certs"),
            PathBuf::from("/etc/pki/tls/certs"),
            PathBuf::from("/etc/pki/ca-trust/source/anchors"),
            PathBuf::from("/usr/share/ca-certificates"),
            PathBuf::from("/usr/local/share/ca-certificates"),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".local").join("share").join("ca-certificates"));
        }
        paths
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        vec![PathBuf::from("/etc/ssl/certs"), PathBuf::from("/usr/local/etc/ssl/certs")]
    }
}

/// Get the platform name as a string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "Windows"
    }

    #[cfg(target_os = "macos")]
    {
        "macOS"
    }

    #[cfg(target_os = "linux")]
    {
        "Linux"
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "Unknown"
    }
}
