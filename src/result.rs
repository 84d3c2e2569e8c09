//! Validation outcomes stored in the response cache and returned to callers.

use crate::error::{ErrorCode, RevocationCheckError};
use crate::identity::CertIdentity;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const KIND_REVOCATION_CHECK: &str = "RevocationCheckError";
pub(crate) const KIND_VALUE: &str = "ValueError";
pub(crate) const KIND_GENERIC: &str = "Error";

/// Current time as Unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// A failure captured so that it can be cached and raised again later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedError {
    /// Domain error carrying a stable code.
    RevocationCheck { code: ErrorCode, message: String },
    /// Malformed input: certificate, response or parameter.
    Value { message: String },
    /// Message-only failure.
    Generic { message: String },
    /// Kind tag this build does not recognize.
    Unrecognized { kind: String, message: String },
}

impl CapturedError {
    /// Rebuild from the persisted (kind, message, code) triple.
    ///
    /// Unknown kinds become [`ErrorCode::CacheCorrupted`] pointing at `cache_dir`.
    pub fn from_parts(kind: &str, message: String, code: Option<u32>, cache_dir: &str) -> Self {
        match (kind, code) {
            (KIND_REVOCATION_CHECK, Some(code)) => CapturedError::RevocationCheck {
                code: ErrorCode::from_errno(code),
                message,
            },
            (KIND_VALUE, _) => CapturedError::Value { message },
            (KIND_GENERIC, _) => CapturedError::Generic { message },
            _ => {
                let corrupted = RevocationCheckError::cache_corrupted(cache_dir);
                CapturedError::RevocationCheck {
                    code: corrupted.code,
                    message: corrupted.message,
                }
            }
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            CapturedError::RevocationCheck { .. } => KIND_REVOCATION_CHECK,
            CapturedError::Value { .. } => KIND_VALUE,
            CapturedError::Generic { .. } => KIND_GENERIC,
            CapturedError::Unrecognized { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CapturedError::RevocationCheck { message, .. }
            | CapturedError::Value { message }
            | CapturedError::Generic { message }
            | CapturedError::Unrecognized { message, .. } => message,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CapturedError::RevocationCheck { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.code() == Some(ErrorCode::CertStatusRevoked)
    }

    /// The error to raise when this captured failure is replayed.
    pub fn to_error(&self) -> RevocationCheckError {
        match self {
            CapturedError::RevocationCheck { code, message } => RevocationCheckError::new(*code, message.clone()),
            CapturedError::Value { message } => RevocationCheckError::new(ErrorCode::ResponseDecodeFailure, message.clone()),
            CapturedError::Generic { message } => RevocationCheckError::new(ErrorCode::ResponseUnavailable, message.clone()),
            CapturedError::Unrecognized { kind, message } => RevocationCheckError::new(
                ErrorCode::CacheCorrupted,
                format!("unrecognized error kind {}: {}", kind, message),
            ),
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{} ({}): {}", self.kind(), code, self.message()),
            None => write!(f, "{}: {}", self.kind(), self.message()),
        }
    }
}

impl From<RevocationCheckError> for CapturedError {
    fn from(err: RevocationCheckError) -> Self {
        CapturedError::RevocationCheck {
            code: err.code,
            message: err.message,
        }
    }
}

/// Outcome of checking one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Responder confirmed a "good" status.
    Validated {
        ocsp_response: Vec<u8>,
        issuer_cert: Vec<u8>,
        subject_cert: Vec<u8>,
        cert_id: CertIdentity,
        timestamp: i64,
    },
    /// Definitive failure, cached so it can be replayed.
    Failed { error: CapturedError, timestamp: i64 },
}

impl ValidationResult {
    pub fn validated(ocsp_response: Vec<u8>, issuer_cert: Vec<u8>, subject_cert: Vec<u8>, cert_id: CertIdentity) -> Self {
        ValidationResult::Validated {
            ocsp_response,
            issuer_cert,
            subject_cert,
            cert_id,
            timestamp: unix_now(),
        }
    }

    pub fn failed(error: impl Into<CapturedError>) -> Self {
        ValidationResult::Failed {
            error: error.into(),
            timestamp: unix_now(),
        }
    }

    /// Replace the recorded time; used to age entries deliberately.
    pub fn with_timestamp(mut self, ts: i64) -> Self {
        match &mut self {
            ValidationResult::Validated { timestamp, .. } | ValidationResult::Failed { timestamp, .. } => *timestamp = ts,
        }
        self
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ValidationResult::Validated { timestamp, .. } | ValidationResult::Failed { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_validated(&self) -> bool {
        matches!(self, ValidationResult::Validated { .. })
    }

    pub fn error(&self) -> Option<&CapturedError> {
        match self {
            ValidationResult::Failed { error, .. } => Some(error),
            ValidationResult::Validated { .. } => None,
        }
    }

    /// Age in seconds relative to `now`; negative ages count as fresh.
    pub fn age(&self, now: i64) -> i64 {
        now - self.timestamp()
    }
}
