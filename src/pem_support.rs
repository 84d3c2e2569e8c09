//! PEM certificate file support.
//!
//! Reads certificate chains from PEM or DER files, leaf first, as they are
//! presented by a TLS server.

use crate::error::LoadError;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fs;
use std::io::BufReader;
use std::path::Path;

/// Certificate file format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFormat {
    /// PEM format (Base64 encoded)
    PEM,
    /// DER format (Binary)
    DER,
    /// Auto-detect format
    Auto,
}

/// Load certificates from a PEM or DER file
pub fn load_certificates_from_file<P: AsRef<Path>>(path: P, format: CertificateFormat) -> Result<Vec<Vec<u8>>, LoadError> {
    let path = path.as_ref();
    let contents = fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let certs = match format {
        CertificateFormat::PEM => parse_pem_certificates(&contents)?,
        CertificateFormat::DER => vec![contents],
        CertificateFormat::Auto => {
            if looks_like_pem(&contents) {
                parse_pem_certificates(&contents)?
            } else {
                vec![contents]
            }
        }
    };

    if certs.is_empty() || certs.iter().all(|c| c.is_empty()) {
        return Err(LoadError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn looks_like_pem(contents: &[u8]) -> bool {
    contents.windows(10).any(|w| w == b"-----BEGIN")
}

/// Parse PEM certificates from bytes
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut reader = BufReader::new(pem_data);
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| LoadError::Pem(e.to_string()))?;

    if certs.is_empty() {
        return Err(LoadError::NoCertificates("PEM data".to_string()));
    }

    Ok(certs)
}

/// Convert DER certificate to PEM format
pub fn der_to_pem(der_data: &[u8]) -> String {
    let encoded = STANDARD.encode(der_data);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Concatenate a chain into one PEM document.
pub fn chain_to_pem(chain: &[Vec<u8>]) -> String {
    chain.iter().map(|der| der_to_pem(der)).collect()
}
