//! # ocspcheck
//!
//! OCSP revocation checking for the certificate chain a TLS server presents.
//!
//! ## Features
//!
//! - Per-certificate OCSP checks with signature and validity verification
//! - Delegated responder certificates
//! - Thread-safe response cache persisted across restarts
//! - Legacy cache-server and relay ("new endpoint") routing
//! - Fail-open and fail-close policies
//!
//! ## Quick Start
//!
//! ```no_run
//! use ocspcheck::{OcspConfig, OcspValidator};
//!
//! let validator = OcspValidator::new(OcspConfig::from_env()).unwrap();
//! let chain: Vec<Vec<u8>> = Vec::new(); // DER certificates, leaf first
//! match validator.validate("account.snowflakecomputing.com", &chain) {
//!     Ok(_) => println!("chain accepted"),
//!     Err(e) => eprintln!("rejected ({}): {}", e.errno(), e.message),
//! }
//! ```

extern crate savefile;
#[macro_use]
extern crate savefile_derive;

mod backend;
mod cache;
mod chain;
mod config;
mod endpoint;
mod error;
mod identity;
mod ocsp;
mod pem_support;
mod platform;
mod result;
mod retry;
mod transport;
mod trust_store;
mod validator;
mod x509;

pub use backend::{Certificate, CryptoBackend, KeyAlgorithm, PublicKey, SignatureAlgorithm};
pub use cache::{
    deserialize_entries, serialize_entries, shared_cache, CacheConfig, CacheStatistics, ResponseCache,
    CACHE_FORMAT_VERSION,
};
pub use chain::{CertPair, ChainBuilder};
pub use config::{parse_bool, OcspConfig, TestOverrides};
pub use endpoint::{top_level_domain_of, EndpointResolver, DEFAULT_TOP_LEVEL_DOMAIN};
pub use error::{CacheError, DecodeError, ErrorCode, LoadError, RevocationCheckError, TransportError, UnsupportedAlgorithmError};
pub use identity::{CacheKey, CertIdentity, HashAlgorithm};
pub use ocsp::{
    decode_response, encode_cert_id, encode_request, OcspStatus, ParsedOcspResponse, ResponseStatus, RevocationReason,
    SingleResponse,
};
pub use pem_support::{chain_to_pem, der_to_pem, load_certificates_from_file, parse_pem_certificates, CertificateFormat};
pub use platform::{cache_file_path, default_cache_dir, get_system_cert_paths, platform_name, resolve_cache_dir};
pub use result::{unix_now, CapturedError, ValidationResult};
pub use retry::{retry_with_backoff, RetryConfig, RetryableError};
pub use transport::{FetchRequest, HttpMethod, HttpTransport, OcspTransport};
pub use trust_store::{TrustStore, TrustStoreBuilder};
pub use validator::{CertificateOutcome, OcspValidator, RelayRequest, ValidationReport};
pub use x509::X509Backend;
