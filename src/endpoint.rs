//! OCSP cache-server and relay endpoint resolution.
//!
//! Two routing modes exist. Legacy mode downloads a JSON response cache from
//! `http://ocsp.snowflakecomputing.<tld>` and, for private-link deployments,
//! proxies responder GETs through a `/retry/{0}/{1}` template. Relay mode
//! (the "new endpoint") POSTs to `https://ocspssd.<...>/ocsp/fetch` and
//! `.../ocsp/retry`.
//!
//! Resolution never fails: hostnames that cannot be classified fall back to
//! the default relay of the configured top-level domain.

use log::debug;
use url::form_urlencoded;

pub const DEFAULT_TOP_LEVEL_DOMAIN: &str = "com";
pub const CACHE_SERVER_FILE_NAME: &str = "ocsp_response_cache.json";

const SNOWFLAKE_DOMAIN: &str = "snowflakecomputing";
const RELAY_PREFIX: &str = "ocspssd";

/// Split `scheme://netloc/path?query` into (scheme, netloc, path).
///
/// The netloc is returned verbatim, explicit default ports included.
fn split_url(url: &str) -> (&str, &str, &str) {
    let (scheme, rest) = match url.find("://") {
        Some(idx) => (&url[..idx], &url[idx + 3..]),
        None => ("", url),
    };
    let rest = rest.split(['?', '#']).next().unwrap_or("");
    let (netloc, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let netloc = netloc.rsplit('@').next().unwrap_or(netloc);
    (scheme, netloc, path)
}

fn host_of(netloc: &str) -> &str {
    match netloc.rfind(':') {
        Some(idx) if netloc[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &netloc[..idx],
        _ => netloc,
    }
}

/// Where a hostname sits in the snowflakecomputing domain family.
#[derive(Debug, PartialEq, Eq)]
enum HostClass<'a> {
    /// `<...>.privatelink.snowflakecomputing.<tld>`
    PrivateLink,
    /// `<account>[-<id>].global.snowflakecomputing.<tld>`
    Global { id: Option<&'a str>, tld: &'a str },
    /// `<account>.<rest>.snowflakecomputing.<tld>`, `rest` possibly empty
    Regional { rest: &'a str },
    Foreign,
}

/// Multi-label suffixes accepted after `snowflakecomputing`.
const MULTI_LABEL_TOP_LEVEL_DOMAINS: &[&str] = &["com.cn"];

fn is_top_level_domain(tld: &str) -> bool {
    if MULTI_LABEL_TOP_LEVEL_DOMAINS.contains(&tld) {
        return true;
    }
    !tld.is_empty() && tld.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Split `hostname` around its trailing `.snowflakecomputing.<tld>`.
///
/// The suffix must end the hostname; `x.snowflakecomputing.com.evil.org`
/// does not match.
fn split_snowflake_host(hostname: &str) -> Option<(&str, &str)> {
    let marker = format!(".{}.", SNOWFLAKE_DOMAIN);
    let idx = hostname.rfind(&marker)?;
    let prefix = &hostname[..idx];
    let tld = &hostname[idx + marker.len()..];
    if prefix.is_empty() || !is_top_level_domain(tld) {
        return None;
    }
    Some((prefix, tld))
}

fn classify(hostname: &str) -> HostClass<'_> {
    let Some((prefix, tld)) = split_snowflake_host(hostname) else {
        return HostClass::Foreign;
    };

    let labels: Vec<&str> = prefix.split('.').collect();
    match labels.last() {
        Some(&"privatelink") if labels.len() > 1 => HostClass::PrivateLink,
        Some(&"global") if labels.len() > 1 => HostClass::Global {
            id: labels[0].split_once('-').map(|(_, id)| id),
            tld,
        },
        _ => {
            let rest = hostname.split_once('.').map(|(_, rest)| rest).unwrap_or("");
            HostClass::Regional { rest }
        }
    }
}

/// Top-level domain of a snowflakecomputing hostname, if it is one.
pub fn top_level_domain_of(hostname: &str) -> Option<&str> {
    split_snowflake_host(hostname).map(|(_, tld)| tld)
}

/// Resolved endpoint state for one connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolver {
    top_level_domain: String,
    new_endpoint: bool,
    cache_server_override: Option<String>,
    cache_server_url: String,
    retry_url: Option<String>,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        EndpointResolver::new(DEFAULT_TOP_LEVEL_DOMAIN, false)
    }
}

impl EndpointResolver {
    pub fn new(top_level_domain: &str, new_endpoint: bool) -> Self {
        let top_level_domain = top_level_domain.trim_matches('.').to_ascii_lowercase();
        let top_level_domain = if top_level_domain.is_empty() {
            DEFAULT_TOP_LEVEL_DOMAIN.to_string()
        } else {
            top_level_domain
        };
        let cache_server_url = format!("http://ocsp.{}.{}/{}", SNOWFLAKE_DOMAIN, top_level_domain, CACHE_SERVER_FILE_NAME);
        EndpointResolver {
            top_level_domain,
            new_endpoint,
            cache_server_override: None,
            cache_server_url,
            retry_url: None,
        }
    }

    /// Pin the legacy cache server URL; hostname resolution no longer replaces it.
    pub fn with_cache_server_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.cache_server_url = url.clone();
        self.cache_server_override = Some(url);
        self.retry_url = None;
        self
    }

    pub fn top_level_domain(&self) -> &str {
        &self.top_level_domain
    }

    pub fn is_new_endpoint(&self) -> bool {
        self.new_endpoint
    }

    pub fn cache_server_url(&self) -> &str {
        &self.cache_server_url
    }

    pub fn retry_url(&self) -> Option<&str> {
        self.retry_url.as_deref()
    }

    /// `http://ocsp.snowflakecomputing.<tld>`
    pub fn default_cache_server_url(&self) -> String {
        format!("http://ocsp.{}.{}", SNOWFLAKE_DOMAIN, self.top_level_domain)
    }

    /// `https://ocspssd.snowflakecomputing.<tld>/ocsp/`
    pub fn default_relay_base_url(&self) -> String {
        format!("https://{}.{}.{}/ocsp/", RELAY_PREFIX, SNOWFLAKE_DOMAIN, self.top_level_domain)
    }

    /// Relay base URL for `hostname`, ending in `/ocsp/`.
    pub fn relay_base_url(&self, hostname: &str) -> String {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        match classify(&hostname) {
            HostClass::PrivateLink => format!("https://{}.{}/ocsp/", RELAY_PREFIX, hostname),
            HostClass::Global { id: Some(id), tld } => {
                format!("https://{}-{}.global.{}.{}/ocsp/", RELAY_PREFIX, id, SNOWFLAKE_DOMAIN, tld)
            }
            HostClass::Global { id: None, tld } => {
                format!("https://{}.global.{}.{}/ocsp/", RELAY_PREFIX, SNOWFLAKE_DOMAIN, tld)
            }
            HostClass::Regional { rest } => format!("https://{}.{}/ocsp/", RELAY_PREFIX, rest),
            HostClass::Foreign => self.default_relay_base_url(),
        }
    }

    /// Recompute `cache_server_url` and `retry_url` for a connection to `hostname`.
    pub fn reset_endpoint(&mut self, hostname: &str) {
        if self.new_endpoint {
            let base = self.relay_base_url(hostname);
            self.cache_server_url = format!("{}fetch", base);
            self.retry_url = Some(format!("{}retry", base));
        } else {
            self.cache_server_url = match &self.cache_server_override {
                Some(url) => url.clone(),
                None => self.legacy_cache_server_url(hostname),
            };
            self.reset_dynamic_cache_server_url();
        }
        debug!(
            "OCSP endpoints for {}: cache server {}, retry {:?}",
            hostname, self.cache_server_url, self.retry_url
        );
    }

    fn legacy_cache_server_url(&self, hostname: &str) -> String {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        match classify(&hostname) {
            HostClass::PrivateLink => format!("http://ocsp.{}/{}", hostname, CACHE_SERVER_FILE_NAME),
            _ => {
                let tld = top_level_domain_of(&hostname).unwrap_or(&self.top_level_domain);
                format!("http://ocsp.{}.{}/{}", SNOWFLAKE_DOMAIN, tld, CACHE_SERVER_FILE_NAME)
            }
        }
    }

    /// Derive the legacy retry template from the current cache server URL.
    ///
    /// The bare `ocsp.snowflakecomputing.<tld>` host has no retry proxy; any
    /// other host gets `<scheme>://<netloc>/retry/{0}/{1}`.
    pub fn reset_dynamic_cache_server_url(&mut self) {
        let (scheme, netloc, _) = split_url(&self.cache_server_url);
        let host = host_of(netloc).to_ascii_lowercase();
        let bare_default = format!("ocsp.{}.", SNOWFLAKE_DOMAIN);
        self.retry_url = if netloc.is_empty() || host.starts_with(&bare_default) {
            None
        } else {
            let scheme = if scheme.is_empty() { "http" } else { scheme };
            Some(format!("{}://{}/retry/{{0}}/{{1}}", scheme, netloc))
        };
    }

    /// The legacy GET template, if one is active.
    pub fn retry_url_template(&self) -> Option<&str> {
        if self.new_endpoint {
            None
        } else {
            self.retry_url.as_deref()
        }
    }

    /// URL for an RFC 6960 GET of `cert_id_base64` from `responder_url`,
    /// routed through the retry template when one is active.
    pub fn generate_get_url(&self, responder_url: &str, cert_id_base64: &str) -> String {
        match self.retry_url_template() {
            Some(template) => {
                let (_, netloc, path) = split_url(responder_url);
                let path = path.trim_matches('/');
                let target = if path.is_empty() {
                    netloc.to_string()
                } else {
                    format!("{}/{}", netloc, path)
                };
                let encoded: String = form_urlencoded::byte_serialize(cert_id_base64.as_bytes()).collect();
                template.replace("{0}", &target).replace("{1}", &encoded)
            }
            None => format!("{}/{}", responder_url.trim_end_matches('/'), cert_id_base64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_url_keeps_port() {
        assert_eq!(
            split_url("http://ocsp.example.com:80/ocsp_response_cache.json"),
            ("http", "ocsp.example.com:80", "/ocsp_response_cache.json")
        );
        assert_eq!(split_url("http://ocsp.example.com"), ("http", "ocsp.example.com", ""));
        assert_eq!(split_url("https://u@h:8443/p?q=1"), ("https", "h:8443", "/p"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("a.privatelink.snowflakecomputing.com"), HostClass::PrivateLink);
        assert_eq!(
            classify("a-1.global.snowflakecomputing.com"),
            HostClass::Global { id: Some("1"), tld: "com" }
        );
        assert_eq!(
            classify("a1.us-east-1.snowflakecomputing.com"),
            HostClass::Regional { rest: "us-east-1.snowflakecomputing.com" }
        );
        assert_eq!(classify("snowflake.okta.com"), HostClass::Foreign);
        assert_eq!(classify("x.snowflakecomputing.com.evil.org"), HostClass::Foreign);
        assert_eq!(classify("www.snowflakecomputing.com.cn.com"), HostClass::Foreign);
        assert_eq!(
            classify("a1.cn-north-1.snowflakecomputing.com.cn"),
            HostClass::Regional { rest: "cn-north-1.snowflakecomputing.com.cn" }
        );
        assert_eq!(classify(""), HostClass::Foreign);
    }

    #[test]
    fn test_default_urls() {
        let resolver = EndpointResolver::default();
        assert_eq!(resolver.default_cache_server_url(), "http://ocsp.snowflakecomputing.com");
        assert_eq!(resolver.default_relay_base_url(), "https://ocspssd.snowflakecomputing.com/ocsp/");
        assert_eq!(
            resolver.cache_server_url(),
            "http://ocsp.snowflakecomputing.com/ocsp_response_cache.json"
        );
        assert!(resolver.retry_url().is_none());

        let cn = EndpointResolver::new("cn", false);
        assert_eq!(cn.default_cache_server_url(), "http://ocsp.snowflakecomputing.cn");
    }

    #[test]
    fn test_relay_global_without_id() {
        let resolver = EndpointResolver::new("com", true);
        assert_eq!(
            resolver.relay_base_url("acct.global.snowflakecomputing.com"),
            "https://ocspssd.global.snowflakecomputing.com/ocsp/"
        );
    }

    #[test]
    fn test_legacy_private_link_hostname_gets_retry_template() {
        let mut resolver = EndpointResolver::default();
        resolver.reset_endpoint("acct.us-east-1.privatelink.snowflakecomputing.com");
        assert_eq!(
            resolver.cache_server_url(),
            "http://ocsp.acct.us-east-1.privatelink.snowflakecomputing.com/ocsp_response_cache.json"
        );
        assert_eq!(
            resolver.retry_url(),
            Some("http://ocsp.acct.us-east-1.privatelink.snowflakecomputing.com/retry/{0}/{1}")
        );
    }

    #[test]
    fn test_legacy_public_hostname_uses_its_tld() {
        let mut resolver = EndpointResolver::default();
        resolver.reset_endpoint("test.snowflakecomputing.cn");
        assert_eq!(
            resolver.cache_server_url(),
            "http://ocsp.snowflakecomputing.cn/ocsp_response_cache.json"
        );
        assert!(resolver.retry_url().is_none());
    }

    #[test]
    fn test_cache_server_override_survives_reset() {
        let mut resolver = EndpointResolver::default().with_cache_server_url("http://cache.internal:8080/ocsp_response_cache.json");
        resolver.reset_endpoint("a.snowflakecomputing.com");
        assert_eq!(resolver.cache_server_url(), "http://cache.internal:8080/ocsp_response_cache.json");
        assert_eq!(resolver.retry_url(), Some("http://cache.internal:8080/retry/{0}/{1}"));
    }

    #[test]
    fn test_get_url_without_template() {
        let resolver = EndpointResolver::default();
        assert_eq!(
            resolver.generate_get_url("http://ocsp.example.com/", "MEQw/+="),
            "http://ocsp.example.com/MEQw/+="
        );
    }

    #[test]
    fn test_relay_mode_get_url_is_direct() {
        let mut resolver = EndpointResolver::new("com", true);
        resolver.reset_endpoint("a1.us-east-1.snowflakecomputing.com");
        assert_eq!(
            resolver.generate_get_url("http://ocsp.example.com", "abc"),
            "http://ocsp.example.com/abc"
        );
    }
}
