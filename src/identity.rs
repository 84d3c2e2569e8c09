//! Certificate identities used as OCSP CertIDs and cache keys.

use crate::backend::Certificate;
use crate::error::UnsupportedAlgorithmError;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash algorithms accepted for CertID computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Savefile)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Dotted OID of the algorithm as it appears in a CertID.
    pub fn oid(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "1.3.14.3.2.26",
            HashAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    pub fn from_oid(oid: &str) -> Result<Self, UnsupportedAlgorithmError> {
        match oid {
            "1.3.14.3.2.26" => Ok(HashAlgorithm::Sha1),
            "2.16.840.1.101.3.4.2.1" => Ok(HashAlgorithm::Sha256),
            "2.16.840.1.101.3.4.2.2" => Ok(HashAlgorithm::Sha384),
            "2.16.840.1.101.3.4.2.3" => Ok(HashAlgorithm::Sha512),
            other => Err(UnsupportedAlgorithmError(format!("hash algorithm {}", other))),
        }
    }

    /// Parse a name such as `sha256` or `SHA-256`.
    pub fn from_name(name: &str) -> Result<Self, UnsupportedAlgorithmError> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(UnsupportedAlgorithmError(format!("hash algorithm {}", name))),
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// OCSP identity of a certificate: who issued it and its serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Savefile)]
pub struct CertIdentity {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial_number: Vec<u8>,
}

impl CertIdentity {
    /// Derive the identity of `subject` as issued by `issuer`.
    pub fn compute(issuer: &Certificate, subject: &Certificate, hash_algorithm: HashAlgorithm) -> Self {
        CertIdentity {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(&issuer.subject),
            issuer_key_hash: hash_algorithm.digest(&issuer.public_key.key),
            serial_number: normalize_serial(&subject.serial),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            issuer_name_hash: self.issuer_name_hash.clone(),
            issuer_key_hash: self.issuer_key_hash.clone(),
            serial_number: self.serial_number.clone(),
        }
    }

    pub fn serial_hex(&self) -> String {
        self.serial_number.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

/// Composite cache key: (issuer-name-hash, issuer-key-hash, serial-number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Savefile)]
pub struct CacheKey {
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial_number: Vec<u8>,
}

impl CacheKey {
    pub fn new(issuer_name_hash: Vec<u8>, issuer_key_hash: Vec<u8>, serial_number: Vec<u8>) -> Self {
        CacheKey {
            issuer_name_hash,
            issuer_key_hash,
            serial_number,
        }
    }
}

/// Strip redundant leading zero octets so serials compare equal regardless
/// of whether the encoder kept the sign byte.
pub(crate) fn normalize_serial(serial: &[u8]) -> Vec<u8> {
    let first = serial.iter().position(|b| *b != 0).unwrap_or(serial.len().saturating_sub(1));
    serial[first..].to_vec()
}
