//! Collaborator seam for certificate decoding, signature verification and
//! the OCSP wire codec.
//!
//! The validator only talks to a [`CryptoBackend`]; [`crate::X509Backend`]
//! is the default implementation.

use crate::error::{DecodeError, UnsupportedAlgorithmError};
use crate::identity::{CertIdentity, HashAlgorithm};
use crate::ocsp::ParsedOcspResponse;

/// Public key algorithm of a certificate's subject public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
    Other(String),
}

/// Subject public key: the algorithm plus the raw BIT STRING contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: KeyAlgorithm,
    pub key: Vec<u8>,
}

/// Signature algorithms the validator may encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaPkcs1(HashAlgorithm),
    Ecdsa(HashAlgorithm),
    Ed25519,
    /// Recognized OID the backend has no verifier for (SHA-3 family etc).
    Unsupported(String),
}

impl SignatureAlgorithm {
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.5" => SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha1),
            "1.2.840.113549.1.1.11" => SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha256),
            "1.2.840.113549.1.1.12" => SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha384),
            "1.2.840.113549.1.1.13" => SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha512),
            "1.2.840.10045.4.1" => SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha1),
            "1.2.840.10045.4.3.2" => SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha256),
            "1.2.840.10045.4.3.3" => SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha384),
            "1.2.840.10045.4.3.4" => SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha512),
            "1.3.101.112" => SignatureAlgorithm::Ed25519,
            other => SignatureAlgorithm::Unsupported(other.to_string()),
        }
    }
}

/// Owned view of a decoded X.509 certificate with the fields OCSP needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Full DER encoding.
    pub der: Vec<u8>,
    /// DER of the TBSCertificate, the bytes covered by `signature`.
    pub tbs: Vec<u8>,
    /// DER-encoded subject Name.
    pub subject: Vec<u8>,
    /// DER-encoded issuer Name.
    pub issuer: Vec<u8>,
    /// Printable subject, for messages only.
    pub subject_display: String,
    pub serial: Vec<u8>,
    pub public_key: PublicKey,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    pub not_before: i64,
    pub not_after: i64,
    /// OCSP responder URLs from the Authority Information Access extension.
    pub ocsp_urls: Vec<String>,
    pub is_ca: bool,
}

impl Certificate {
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.issuer == issuer.subject
    }

    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }
}

/// Certificate, signature and OCSP codec capability consumed by the validator.
pub trait CryptoBackend: Send + Sync {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, DecodeError>;

    /// Verify `signature` over `signed_bytes`. `Ok(false)` means the signature
    /// does not match; an algorithm with no verifier is an error.
    fn verify_signature(
        &self,
        algorithm: &SignatureAlgorithm,
        signature: &[u8],
        public_key: &PublicKey,
        signed_bytes: &[u8],
    ) -> Result<bool, UnsupportedAlgorithmError>;

    fn parse_ocsp_response(&self, der: &[u8]) -> Result<ParsedOcspResponse, DecodeError>;

    /// DER-encoded OCSPRequest for a single certificate.
    fn encode_ocsp_request(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError>;

    /// DER-encoded CertID, the key used by the legacy cache server.
    fn encode_cert_id(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError>;
}
