//! OCSP chain validation.
//!
//! For each (issuer, subject) pair of a presented chain the validator
//! computes the certificate's OCSP identity, consults the response cache,
//! fetches a response on a miss, verifies it and records the outcome. The
//! per-certificate outcomes are then folded into one verdict under the
//! fail-open / fail-close policy.
//!
//! A confirmed revocation always rejects. Any other failure rejects only in
//! fail-close mode.

use crate::backend::{Certificate, CryptoBackend};
use crate::cache::{shared_cache, CacheConfig, ResponseCache};
use crate::chain::{CertPair, ChainBuilder};
use crate::config::OcspConfig;
use crate::endpoint::EndpointResolver;
use crate::error::{ErrorCode, RevocationCheckError, TransportError};
use crate::identity::CertIdentity;
use crate::ocsp::{OcspStatus, ResponseStatus};
use crate::pem_support::{load_certificates_from_file, CertificateFormat};
use crate::platform;
use crate::result::{unix_now, ValidationResult};
use crate::retry::retry_with_backoff;
use crate::transport::{FetchRequest, HttpTransport, OcspTransport, JSON_CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE};
use crate::trust_store::TrustStore;
use crate::x509::X509Backend;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

/// Body POSTed to the relay endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub hostname: String,
    /// Base64 DER OCSPRequest.
    pub ocsp_request: String,
    /// Base64 DER CertID.
    pub cert_id: String,
    pub ocsp_responder_url: String,
}

/// Outcome for one certificate of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub subject: String,
    pub serial: String,
    pub result: ValidationResult,
    /// Served from the response cache without a new fetch.
    pub from_cache: bool,
}

/// Per-certificate outcomes of one chain validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub hostname: String,
    pub outcomes: Vec<CertificateOutcome>,
}

impl ValidationReport {
    /// Fold the outcomes into one verdict.
    ///
    /// Revocations are reported first and reject regardless of `fail_open`.
    pub fn verdict(&self, fail_open: bool) -> Result<bool, RevocationCheckError> {
        let failures = self
            .outcomes
            .iter()
            .filter_map(|outcome| outcome.result.error().map(|error| (outcome, error)));

        let mut first_unresolved = None;
        for (outcome, error) in failures {
            if error.is_revoked() {
                error!("Certificate {} is revoked: {}", outcome.subject, error.message());
                return Err(error.to_error());
            }
            first_unresolved.get_or_insert((outcome, error));
        }

        match first_unresolved {
            None => Ok(true),
            Some((outcome, error)) if fail_open => {
                warn!(
                    "OCSP status of {} could not be determined ({}); accepting because fail-open is enabled",
                    outcome.subject, error
                );
                Ok(true)
            }
            Some((_, error)) => Err(error.to_error()),
        }
    }
}

/// Where a response may come from, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResponseSource {
    /// JSON document downloaded from the legacy cache server.
    LegacyCacheServer,
    /// Relay endpoint taking a [`RelayRequest`].
    Relay { url: String, is_cache_server: bool },
    /// The responder named in the certificate.
    Responder,
}

/// State scoped to one `validate` call.
struct FetchContext<'a> {
    hostname: &'a str,
    resolver: EndpointResolver,
    legacy_cache: OnceCell<HashMap<Vec<u8>, Vec<u8>>>,
}

/// OCSP validator for certificate chains.
pub struct OcspValidator {
    config: OcspConfig,
    cache: Arc<ResponseCache>,
    backend: Arc<dyn CryptoBackend>,
    transport: Arc<dyn OcspTransport>,
    trust_store: TrustStore,
    load_once: Once,
}

impl OcspValidator {
    /// Validator over the process-wide cache, the default crypto backend, an
    /// HTTP transport and the system trust store.
    ///
    /// A `cache_max_age` other than the shared cache's gets a private cache.
    pub fn new(config: OcspConfig) -> Result<Self, RevocationCheckError> {
        let transport = HttpTransport::new()?;
        let shared = shared_cache();
        let cache = if shared.config().max_age == config.cache_max_age {
            shared
        } else {
            Arc::new(ResponseCache::with_config(CacheConfig {
                max_age: config.cache_max_age,
                ..CacheConfig::default()
            }))
        };
        Ok(OcspValidator::with_parts(
            config,
            cache,
            Arc::new(X509Backend::new()),
            Arc::new(transport),
        )
        .with_trust_store(TrustStore::system()))
    }

    /// Validator over explicit collaborators and an empty trust store.
    pub fn with_parts(
        config: OcspConfig,
        cache: Arc<ResponseCache>,
        backend: Arc<dyn CryptoBackend>,
        transport: Arc<dyn OcspTransport>,
    ) -> Self {
        OcspValidator {
            config,
            cache,
            backend,
            transport,
            trust_store: TrustStore::empty(),
            load_once: Once::new(),
        }
    }

    pub fn with_trust_store(mut self, trust_store: TrustStore) -> Self {
        self.trust_store = trust_store;
        self
    }

    pub fn config(&self) -> &OcspConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Location of the persisted cache, recomputed on every call.
    pub fn cache_file(&self) -> Option<PathBuf> {
        platform::cache_file_path(self.config.cache_dir.as_deref())
    }

    /// Remove the persisted cache file, if any.
    pub fn delete_cache_file(&self) -> Result<(), crate::error::CacheError> {
        match self.cache_file() {
            Some(path) => self.cache.delete_persisted_file(&path),
            None => Ok(()),
        }
    }

    fn ensure_cache_loaded(&self) {
        self.load_once.call_once(|| {
            if self.config.persist_cache {
                if let Some(path) = self.cache_file() {
                    self.cache.load(&path);
                }
            }
            self.cache.purge_undecodable(self.backend.as_ref());
        });
    }

    fn persist_cache(&self) {
        if !self.config.persist_cache {
            return;
        }
        if let Some(path) = self.cache_file() {
            if let Err(err) = self.cache.save(&path) {
                warn!("Failed to save OCSP cache to {}: {}", path.display(), err);
            }
        }
    }

    /// Check `chain` (DER, leaf first) presented by `hostname`.
    ///
    /// Returns `Ok(true)` when the chain is accepted. Errors are structural
    /// chain problems, revocations, and, in fail-close mode, any certificate
    /// whose status could not be confirmed.
    pub fn validate(&self, hostname: &str, chain: &[Vec<u8>]) -> Result<bool, RevocationCheckError> {
        self.check_chain(hostname, chain)?.verdict(self.config.fail_open)
    }

    /// Load a PEM or DER chain from `path` and validate it against the
    /// configured hostname.
    pub fn validate_file<P: AsRef<Path>>(&self, path: P) -> Result<bool, RevocationCheckError> {
        let chain = load_certificates_from_file(path, CertificateFormat::Auto)?;
        let hostname = self.config.hostname.clone().unwrap_or_default();
        self.validate(&hostname, &chain)
    }

    /// Per-certificate outcomes without applying the fail-open policy.
    pub fn check_chain(&self, hostname: &str, chain: &[Vec<u8>]) -> Result<ValidationReport, RevocationCheckError> {
        self.ensure_cache_loaded();

        let pairs = ChainBuilder::new(self.backend.as_ref(), &self.trust_store).pairs(chain)?;
        let ctx = self.fetch_context(hostname);

        let mut outcomes = Vec::with_capacity(pairs.len());
        let mut dirty = false;
        for pair in &pairs {
            outcomes.push(self.check_pair(&ctx, pair, &mut dirty));
        }

        if dirty {
            self.persist_cache();
        }

        Ok(ValidationReport {
            hostname: hostname.to_string(),
            outcomes,
        })
    }

    fn fetch_context<'a>(&self, hostname: &'a str) -> FetchContext<'a> {
        let tld = self.config.top_level_domain_for(hostname);
        let mut resolver = EndpointResolver::new(&tld, self.config.new_endpoint);
        if let Some(url) = &self.config.cache_server_url {
            resolver = resolver.with_cache_server_url(url.clone());
        }
        resolver.reset_endpoint(hostname);
        FetchContext {
            hostname,
            resolver,
            legacy_cache: OnceCell::new(),
        }
    }

    fn check_pair(&self, ctx: &FetchContext<'_>, pair: &CertPair, dirty: &mut bool) -> CertificateOutcome {
        let cert_id = CertIdentity::compute(&pair.issuer, &pair.subject, self.config.cert_id_hash);
        let subject = pair.subject.subject_display.clone();
        let serial = cert_id.serial_hex();

        match self.cache.get(&cert_id) {
            Some(cached) => {
                let usable = match &cached {
                    ValidationResult::Validated { ocsp_response, .. } => {
                        match self.process_response(ocsp_response, pair, &cert_id) {
                            Ok(()) => true,
                            Err(err) => {
                                warn!("Discarding cached OCSP response for {}: {}", subject, err);
                                self.cache.remove(&cert_id);
                                *dirty = true;
                                false
                            }
                        }
                    }
                    ValidationResult::Failed { .. } => true,
                };
                if usable {
                    debug!("OCSP cache hit for {} (serial {})", subject, serial);
                    return CertificateOutcome {
                        subject,
                        serial,
                        result: cached,
                        from_cache: true,
                    };
                }
            }
            None => debug!("OCSP cache miss for {} (serial {})", subject, serial),
        }

        let result = if self.config.use_network {
            let result = self.resolve_status(ctx, pair, &cert_id);
            self.cache.put(&cert_id, result.clone());
            *dirty = true;
            result
        } else {
            ValidationResult::failed(RevocationCheckError::new(
                ErrorCode::ResponseUnavailable,
                format!("no cached OCSP response for {} and network access is disabled", subject),
            ))
        };

        CertificateOutcome {
            subject,
            serial,
            result,
            from_cache: false,
        }
    }

    fn validated(&self, ocsp_response: Vec<u8>, pair: &CertPair, cert_id: &CertIdentity) -> ValidationResult {
        ValidationResult::validated(ocsp_response, pair.issuer.der.clone(), pair.subject.der.clone(), cert_id.clone())
    }

    fn sources(&self, ctx: &FetchContext<'_>) -> Vec<ResponseSource> {
        let mut sources = Vec::new();
        if ctx.resolver.is_new_endpoint() {
            if self.config.use_cache_server {
                sources.push(ResponseSource::Relay {
                    url: ctx.resolver.cache_server_url().to_string(),
                    is_cache_server: true,
                });
            }
            if let Some(url) = ctx.resolver.retry_url() {
                sources.push(ResponseSource::Relay {
                    url: url.to_string(),
                    is_cache_server: false,
                });
            }
        } else {
            if self.config.use_cache_server {
                sources.push(ResponseSource::LegacyCacheServer);
            }
            sources.push(ResponseSource::Responder);
        }
        sources
    }

    /// Try each source until one yields a definitive answer. Every fetch or
    /// verification failure ends up as a `Failed` result.
    fn resolve_status(&self, ctx: &FetchContext<'_>, pair: &CertPair, cert_id: &CertIdentity) -> ValidationResult {
        let encoded = self
            .backend
            .encode_ocsp_request(cert_id)
            .and_then(|request| Ok((request, self.backend.encode_cert_id(cert_id)?)));
        let (request_der, cert_id_der) = match encoded {
            Ok(encoded) => encoded,
            Err(err) => return ValidationResult::failed(RevocationCheckError::from(err)),
        };

        let mut last_error = None;
        for source in self.sources(ctx) {
            let response = match self.fetch_from(ctx, &source, pair, &request_der, &cert_id_der) {
                Ok(Some(response)) => response,
                Ok(None) => continue,
                Err(err) => {
                    debug!("OCSP source {:?} failed: {}", source, err);
                    last_error = Some(err);
                    continue;
                }
            };

            match self.process_response(&response, pair, cert_id) {
                Ok(()) => return self.validated(response, pair, cert_id),
                Err(err) if err.is_revoked() => return ValidationResult::failed(err),
                Err(err) => {
                    debug!("OCSP response from {:?} rejected: {}", source, err);
                    last_error = Some(err);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| {
            RevocationCheckError::new(
                ErrorCode::ResponseUnavailable,
                format!("no OCSP response available for {}", pair.subject.subject_display),
            )
        });
        ValidationResult::failed(err)
    }

    fn responder_url(&self, subject: &Certificate) -> Result<String, RevocationCheckError> {
        if let Some(url) = &self.config.test_overrides.ocsp_responder_url {
            return Ok(url.clone());
        }
        subject.ocsp_urls.first().cloned().ok_or_else(|| {
            RevocationCheckError::new(
                ErrorCode::UrlInfoMissing,
                format!("no OCSP responder URL in certificate {}", subject.subject_display),
            )
        })
    }

    fn send(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError> {
        retry_with_backoff(&self.config.retry, || self.transport.fetch(request))
    }

    /// `Ok(None)` means the source has nothing for this certificate.
    fn fetch_from(
        &self,
        ctx: &FetchContext<'_>,
        source: &ResponseSource,
        pair: &CertPair,
        request_der: &[u8],
        cert_id_der: &[u8],
    ) -> Result<Option<Vec<u8>>, RevocationCheckError> {
        match source {
            ResponseSource::LegacyCacheServer => {
                let entries = ctx.legacy_cache.get_or_init(|| self.download_legacy_cache(&ctx.resolver));
                Ok(entries.get(cert_id_der).cloned())
            }
            ResponseSource::Relay { url, is_cache_server } => {
                let body = RelayRequest {
                    hostname: ctx.hostname.to_string(),
                    ocsp_request: STANDARD.encode(request_der),
                    cert_id: STANDARD.encode(cert_id_der),
                    ocsp_responder_url: self.responder_url(&pair.subject)?,
                };
                let body = serde_json::to_vec(&body)
                    .map_err(|e| RevocationCheckError::new(ErrorCode::FetchFailure, e.to_string()))?;
                let timeout = if *is_cache_server {
                    self.config.cache_server_timeout
                } else {
                    self.config.effective_responder_timeout()
                };
                let request = FetchRequest::post(url.clone(), JSON_CONTENT_TYPE, body, timeout);
                match self.send(&request) {
                    Ok(response) => Ok(Some(response)),
                    Err(err) if *is_cache_server => Err(RevocationCheckError::new(
                        ErrorCode::CacheServerFailure,
                        format!("OCSP cache server {}: {}", url, err),
                    )),
                    Err(err) => Err(err.into()),
                }
            }
            ResponseSource::Responder => {
                let responder = self.responder_url(&pair.subject)?;
                let timeout = self.config.effective_responder_timeout();
                let request = if self.config.use_post_method {
                    FetchRequest::post(responder, OCSP_REQUEST_CONTENT_TYPE, request_der.to_vec(), timeout)
                } else {
                    let url = ctx.resolver.generate_get_url(&responder, &STANDARD.encode(request_der));
                    FetchRequest::get(url, timeout)
                };
                Ok(Some(self.send(&request)?))
            }
        }
    }

    /// Download `{ "<b64 CertID>": [ts, "<b64 OCSPResponse>"] }` from the
    /// legacy cache server. Failures are logged and yield an empty map.
    fn download_legacy_cache(&self, resolver: &EndpointResolver) -> HashMap<Vec<u8>, Vec<u8>> {
        let url = resolver.cache_server_url();
        let request = FetchRequest::get(url, self.config.cache_server_timeout);
        let body = match self.send(&request) {
            Ok(body) => body,
            Err(err) => {
                warn!("OCSP cache server {} unavailable: {}", url, err);
                return HashMap::new();
            }
        };

        let document: HashMap<String, (f64, String)> = match serde_json::from_slice(&body) {
            Ok(document) => document,
            Err(err) => {
                warn!("OCSP cache server {} returned an unreadable document: {}", url, err);
                return HashMap::new();
            }
        };

        let entries: HashMap<Vec<u8>, Vec<u8>> = document
            .into_iter()
            .filter_map(|(cert_id, (_, response))| {
                let cert_id = STANDARD.decode(cert_id).ok()?;
                let response = STANDARD.decode(response).ok()?;
                Some((cert_id, response))
            })
            .collect();
        info!("Downloaded {} OCSP responses from {}", entries.len(), url);
        entries
    }

    /// Verify a DER OCSP response for `cert_id`.
    ///
    /// A revoked status is reported once the signature checks out, whatever
    /// the validity window says.
    fn process_response(&self, der: &[u8], pair: &CertPair, cert_id: &CertIdentity) -> Result<(), RevocationCheckError> {
        let parsed = self.backend.parse_ocsp_response(der)?;
        if parsed.status != ResponseStatus::Successful {
            return Err(RevocationCheckError::new(
                ErrorCode::StatusUnsuccessful,
                format!("OCSP responder returned {:?}", parsed.status),
            ));
        }

        let single = parsed.find_response(cert_id).ok_or_else(|| {
            RevocationCheckError::new(
                ErrorCode::CertIdMismatch,
                format!("OCSP response does not cover serial {}", cert_id.serial_hex()),
            )
        })?;

        let now = unix_now();
        let signer_key = match parsed.responder_certs.first() {
            Some(der) if *der != pair.issuer.der => {
                let responder = self.backend.decode_certificate(der)?;
                let issued = self.backend.verify_signature(
                    &responder.signature_algorithm,
                    &responder.signature,
                    &pair.issuer.public_key,
                    &responder.tbs,
                )?;
                if !issued {
                    return Err(RevocationCheckError::new(
                        ErrorCode::AttachedCertInvalid,
                        format!("OCSP responder certificate {} is not signed by the issuer", responder.subject_display),
                    ));
                }
                if !responder.is_valid_at(now) {
                    return Err(RevocationCheckError::new(
                        ErrorCode::AttachedCertExpired,
                        format!("OCSP responder certificate {} is outside its validity period", responder.subject_display),
                    ));
                }
                responder.public_key
            }
            _ => pair.issuer.public_key.clone(),
        };

        let signed = self.backend.verify_signature(
            &parsed.signature_algorithm,
            &parsed.signature,
            &signer_key,
            &parsed.tbs_response_data,
        )?;
        if !signed {
            return Err(RevocationCheckError::new(
                ErrorCode::InvalidSignature,
                "failed to verify the OCSP response signature",
            ));
        }

        if let OcspStatus::Revoked { revocation_time, reason } = &single.status {
            return Err(RevocationCheckError::new(
                ErrorCode::CertStatusRevoked,
                format!(
                    "certificate {} has been revoked at {} (reason {:?})",
                    pair.subject.subject_display, revocation_time, reason
                ),
            ));
        }

        self.check_validity(single.this_update, single.next_update, now)?;

        match single.status {
            OcspStatus::Good => Ok(()),
            _ => Err(RevocationCheckError::new(
                ErrorCode::CertStatusUnknown,
                format!("OCSP responder does not know certificate {}", pair.subject.subject_display),
            )),
        }
    }

    /// `this_update - skew <= now <= next_update + max(skew, 1% of the window)`
    fn check_validity(&self, this_update: i64, next_update: Option<i64>, now: i64) -> Result<(), RevocationCheckError> {
        let out_of_validity = |detail: String| RevocationCheckError::new(ErrorCode::ResponseOutOfValidity, detail);

        if self.config.test_overrides.force_bad_response_validity {
            return Err(out_of_validity("response validity forced to fail".to_string()));
        }
        let next_update = next_update.ok_or_else(|| {
            RevocationCheckError::new(ErrorCode::ExpiryInfoMissing, "OCSP response has no nextUpdate")
        })?;

        let skew = self.config.max_clock_skew.as_secs() as i64;
        let tolerance = skew.max((next_update - this_update) / 100);
        if this_update - skew > now || now > next_update + tolerance {
            return Err(out_of_validity(format!(
                "current time {} is outside the response validity {}..{}",
                now, this_update, next_update
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OcspValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcspValidator")
            .field("config", &self.config)
            .field("cache_entries", &self.cache.len())
            .field("trust_roots", &self.trust_store.len())
            .finish()
    }
}
