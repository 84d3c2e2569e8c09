//! Error types for the ocspcheck library.
//!
//! `RevocationCheckError` is the only error surfaced by the validator. The
//! remaining types describe failures of the collaborators (transport, DER
//! decoding, signature algorithms, cache persistence) before they are folded
//! into a revocation-check outcome.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Stable numeric codes attached to every [`RevocationCheckError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UrlInfoMissing,
    CacheServerFailure,
    AttachedCertInvalid,
    AttachedCertExpired,
    InvalidSignature,
    ExpiryInfoMissing,
    ResponseOutOfValidity,
    FetchFailure,
    StatusUnsuccessful,
    CertIdMismatch,
    CertStatusRevoked,
    CertStatusUnknown,
    ResponseDecodeFailure,
    UnsupportedAlgorithm,
    CaCertificateNotFound,
    CacheCorrupted,
    ResponseUnavailable,
    /// A code read back from a cache file that this build does not know.
    Other(u32),
}

impl ErrorCode {
    pub fn errno(self) -> u32 {
        match self {
            ErrorCode::UrlInfoMissing => 254001,
            ErrorCode::CacheServerFailure => 254003,
            ErrorCode::AttachedCertInvalid => 254007,
            ErrorCode::AttachedCertExpired => 254008,
            ErrorCode::InvalidSignature => 254009,
            ErrorCode::ExpiryInfoMissing => 254010,
            ErrorCode::ResponseOutOfValidity => 254011,
            ErrorCode::FetchFailure => 254012,
            ErrorCode::StatusUnsuccessful => 254013,
            ErrorCode::CertIdMismatch => 254014,
            ErrorCode::CertStatusRevoked => 254015,
            ErrorCode::CertStatusUnknown => 254016,
            ErrorCode::ResponseDecodeFailure => 254017,
            ErrorCode::UnsupportedAlgorithm => 254018,
            ErrorCode::CaCertificateNotFound => 254020,
            ErrorCode::CacheCorrupted => 254021,
            ErrorCode::ResponseUnavailable => 254022,
            ErrorCode::Other(n) => n,
        }
    }

    pub fn from_errno(errno: u32) -> Self {
        match errno {
            254001 => ErrorCode::UrlInfoMissing,
            254003 => ErrorCode::CacheServerFailure,
            254007 => ErrorCode::AttachedCertInvalid,
            254008 => ErrorCode::AttachedCertExpired,
            254009 => ErrorCode::InvalidSignature,
            254010 => ErrorCode::ExpiryInfoMissing,
            254011 => ErrorCode::ResponseOutOfValidity,
            254012 => ErrorCode::FetchFailure,
            254013 => ErrorCode::StatusUnsuccessful,
            254014 => ErrorCode::CertIdMismatch,
            254015 => ErrorCode::CertStatusRevoked,
            254016 => ErrorCode::CertStatusUnknown,
            254017 => ErrorCode::ResponseDecodeFailure,
            254018 => ErrorCode::UnsupportedAlgorithm,
            254020 => ErrorCode::CaCertificateNotFound,
            254021 => ErrorCode::CacheCorrupted,
            254022 => ErrorCode::ResponseUnavailable,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errno())
    }
}

/// Failure of an OCSP revocation check.
///
/// Carries a stable [`ErrorCode`] so callers can distinguish a confirmed
/// revocation from an infrastructure failure without matching on messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("OCSP revocation check failed ({code}): {message}")]
pub struct RevocationCheckError {
    pub code: ErrorCode,
    pub message: String,
}

impl RevocationCheckError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RevocationCheckError {
            code,
            message: message.into(),
        }
    }

    pub fn errno(&self) -> u32 {
        self.code.errno()
    }

    pub fn is_revoked(&self) -> bool {
        self.code == ErrorCode::CertStatusRevoked
    }

    pub fn ca_not_found(subject: &str) -> Self {
        Self::new(
            ErrorCode::CaCertificateNotFound,
            format!("CA certificate is NOT found for subject: {}", subject),
        )
    }

    pub fn cache_corrupted(cache_dir: &str) -> Self {
        Self::new(
            ErrorCode::CacheCorrupted,
            format!(
                "unrecognized error kind while deserializing ocsp cache, please try cleaning up the OCSP cache under directory {}",
                cache_dir
            ),
        )
    }
}

/// Errors raised by an [`crate::OcspTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Malformed certificate or OCSP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error: {0}")]
pub struct DecodeError(pub String);

/// Signature or hash algorithm the crypto backend cannot handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported algorithm: {0}")]
pub struct UnsupportedAlgorithmError(pub String);

/// Errors from reading or writing the persisted response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cache format error: {0}")]
    Format(String),
    #[error("failed to replace cache file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors from reading certificate files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("failed to parse PEM data: {0}")]
    Pem(String),
    #[error("no certificates found in {0}")]
    NoCertificates(String),
}

impl From<savefile::SavefileError> for CacheError {
    fn from(err: savefile::SavefileError) -> Self {
        CacheError::Format(err.to_string())
    }
}

impl From<DecodeError> for RevocationCheckError {
    fn from(err: DecodeError) -> Self {
        RevocationCheckError::new(ErrorCode::ResponseDecodeFailure, err.0)
    }
}

impl From<UnsupportedAlgorithmError> for RevocationCheckError {
    fn from(err: UnsupportedAlgorithmError) -> Self {
        RevocationCheckError::new(ErrorCode::UnsupportedAlgorithm, err.to_string())
    }
}

impl From<LoadError> for RevocationCheckError {
    fn from(err: LoadError) -> Self {
        RevocationCheckError::new(ErrorCode::ResponseDecodeFailure, format!("certificate chain: {}", err))
    }
}

impl From<TransportError> for RevocationCheckError {
    fn from(err: TransportError) -> Self {
        RevocationCheckError::new(ErrorCode::FetchFailure, err.to_string())
    }
}
