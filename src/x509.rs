//! Default [`CryptoBackend`]: x509-parser for certificates, ring for
//! signatures, x509-ocsp for the OCSP wire format.

use crate::backend::{Certificate, CryptoBackend, KeyAlgorithm, PublicKey, SignatureAlgorithm};
use crate::error::{DecodeError, UnsupportedAlgorithmError};
use crate::identity::{CertIdentity, HashAlgorithm};
use crate::ocsp::{self, ParsedOcspResponse};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use x509_parser::prelude::*;

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";
const OID_CURVE_P256: &str = "1.2.840.10045.3.1.7";
const OID_CURVE_P384: &str = "1.3.132.0.34";
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Production crypto backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509Backend;

impl X509Backend {
    pub fn new() -> Self {
        X509Backend
    }
}

fn key_algorithm(spki: &SubjectPublicKeyInfo<'_>) -> KeyAlgorithm {
    let oid = spki.algorithm.algorithm.to_id_string();
    match oid.as_str() {
        OID_RSA_ENCRYPTION => KeyAlgorithm::Rsa,
        OID_ED25519 => KeyAlgorithm::Ed25519,
        OID_EC_PUBLIC_KEY => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|params| params.as_oid().ok())
                .map(|curve| curve.to_id_string());
            match curve.as_deref() {
                Some(OID_CURVE_P256) => KeyAlgorithm::EcP256,
                Some(OID_CURVE_P384) => KeyAlgorithm::EcP384,
                Some(other) => KeyAlgorithm::Other(format!("EC curve {}", other)),
                None => KeyAlgorithm::Other("EC without named curve".to_string()),
            }
        }
        _ => KeyAlgorithm::Other(oid),
    }
}

fn ocsp_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() != OID_AD_OCSP {
                    continue;
                }
                if let GeneralName::URI(uri) = &desc.access_location {
                    urls.push(uri.to_string());
                }
            }
        }
    }
    urls
}

fn ring_algorithm(
    algorithm: &SignatureAlgorithm,
    key: &KeyAlgorithm,
) -> Result<&'static dyn VerificationAlgorithm, UnsupportedAlgorithmError> {
    let alg: &'static dyn VerificationAlgorithm = match (algorithm, key) {
        (SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha1), KeyAlgorithm::Rsa) => {
            &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY
        }
        (SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha256), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA256,
        (SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha384), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA384,
        (SignatureAlgorithm::RsaPkcs1(HashAlgorithm::Sha512), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA512,
        (SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha256), KeyAlgorithm::EcP256) => &signature::ECDSA_P256_SHA256_ASN1,
        (SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha384), KeyAlgorithm::EcP256) => &signature::ECDSA_P256_SHA384_ASN1,
        (SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha256), KeyAlgorithm::EcP384) => &signature::ECDSA_P384_SHA256_ASN1,
        (SignatureAlgorithm::Ecdsa(HashAlgorithm::Sha384), KeyAlgorithm::EcP384) => &signature::ECDSA_P384_SHA384_ASN1,
        (SignatureAlgorithm::Ed25519, KeyAlgorithm::Ed25519) => &signature::ED25519,
        (SignatureAlgorithm::Unsupported(oid), _) => {
            return Err(UnsupportedAlgorithmError(format!("signature algorithm {}", oid)));
        }
        (alg, key) => {
            return Err(UnsupportedAlgorithmError(format!("{:?} with {:?} key", alg, key)));
        }
    };
    Ok(alg)
}

impl CryptoBackend for X509Backend {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, DecodeError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| DecodeError(format!("certificate: {}", e)))?;
        let spki = cert.public_key();
        let validity = cert.validity();

        Ok(Certificate {
            der: der.to_vec(),
            tbs: cert.tbs_certificate.as_ref().to_vec(),
            subject: cert.subject().as_raw().to_vec(),
            issuer: cert.issuer().as_raw().to_vec(),
            subject_display: cert.subject().to_string(),
            serial: cert.raw_serial().to_vec(),
            public_key: PublicKey {
                algorithm: key_algorithm(spki),
                key: spki.subject_public_key.data.to_vec(),
            },
            signature_algorithm: SignatureAlgorithm::from_oid(&cert.signature_algorithm.algorithm.to_id_string()),
            signature: cert.signature_value.data.to_vec(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            ocsp_urls: ocsp_urls(&cert),
            is_ca: cert.is_ca(),
        })
    }

    fn verify_signature(
        &self,
        algorithm: &SignatureAlgorithm,
        signature: &[u8],
        public_key: &PublicKey,
        signed_bytes: &[u8],
    ) -> Result<bool, UnsupportedAlgorithmError> {
        let alg = ring_algorithm(algorithm, &public_key.algorithm)?;
        let key = UnparsedPublicKey::new(alg, &public_key.key);
        Ok(key.verify(signed_bytes, signature).is_ok())
    }

    fn parse_ocsp_response(&self, der: &[u8]) -> Result<ParsedOcspResponse, DecodeError> {
        ocsp::decode_response(der)
    }

    fn encode_ocsp_request(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
        ocsp::encode_request(cert_id)
    }

    fn encode_cert_id(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
        ocsp::encode_cert_id(cert_id)
    }
}
