//! Root certificates used to anchor presented chains.
//!
//! A chain whose topmost certificate is not self-signed needs its issuer
//! from somewhere; the trust store is where it is looked up.

use crate::error::LoadError;
use crate::pem_support::{load_certificates_from_file, parse_pem_certificates, CertificateFormat};
use crate::platform::get_system_cert_paths;
use log::debug;
use std::fs;
use std::path::Path;

/// DER-encoded root certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    roots: Vec<Vec<u8>>,
}

impl TrustStore {
    pub fn empty() -> Self {
        TrustStore::default()
    }

    pub fn builder() -> TrustStoreBuilder {
        TrustStoreBuilder::new()
    }

    /// Roots from the platform certificate locations. Unreadable entries are skipped.
    pub fn system() -> Self {
        TrustStoreBuilder::new().with_system_roots().build()
    }

    pub fn roots(&self) -> &[Vec<u8>] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, der: &[u8]) -> bool {
        self.roots.iter().any(|root| root == der)
    }
}

/// Builder for creating trust stores.
///
/// ```no_run
/// use ocspcheck::TrustStore;
///
/// let store = TrustStore::builder()
///     .add_pem_file("/path/to/ca.pem")
///     .unwrap()
///     .add_der_file("/path/to/ca.der")
///     .unwrap()
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct TrustStoreBuilder {
    roots: Vec<Vec<u8>>,
}

impl TrustStoreBuilder {
    pub fn new() -> Self {
        TrustStoreBuilder::default()
    }

    fn push(&mut self, der: Vec<u8>) {
        if !der.is_empty() && !self.roots.contains(&der) {
            self.roots.push(der);
        }
    }

    /// Add every certificate in a PEM file.
    pub fn add_pem_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, LoadError> {
        for der in load_certificates_from_file(path, CertificateFormat::PEM)? {
            self.push(der);
        }
        Ok(self)
    }

    /// Add a root certificate from a DER file.
    pub fn add_der_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, LoadError> {
        for der in load_certificates_from_file(path, CertificateFormat::DER)? {
            self.push(der);
        }
        Ok(self)
    }

    pub fn add_pem_data(mut self, pem_data: &[u8]) -> Result<Self, LoadError> {
        for der in parse_pem_certificates(pem_data)? {
            self.push(der);
        }
        Ok(self)
    }

    pub fn add_der_data(mut self, der_data: Vec<u8>) -> Self {
        self.push(der_data);
        self
    }

    /// Add all `.pem`, `.crt` and `.der` files in a directory.
    ///
    /// Files that hold no readable certificate are skipped; only a directory
    /// that cannot be listed is an error.
    pub fn add_directory<P: AsRef<Path>>(mut self, dir_path: P) -> Result<Self, LoadError> {
        let dir_path = dir_path.as_ref();
        let io_error = |source| LoadError::Io {
            path: dir_path.display().to_string(),
            source,
        };

        for entry in fs::read_dir(dir_path).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if !path.is_file() {
                continue;
            }
            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("pem") | Some("crt") => CertificateFormat::PEM,
                Some("der") => CertificateFormat::DER,
                _ => continue,
            };
            match load_certificates_from_file(&path, format) {
                Ok(certs) => {
                    for der in certs {
                        self.push(der);
                    }
                }
                Err(err) => debug!("Skipping certificate file {}: {}", path.display(), err),
            }
        }

        Ok(self)
    }

    /// Add whatever the platform certificate locations hold.
    pub fn with_system_roots(mut self) -> Self {
        for path in get_system_cert_paths() {
            let result = if path.is_dir() {
                TrustStoreBuilder::new().add_directory(&path)
            } else if path.is_file() {
                TrustStoreBuilder::new().add_pem_file(&path)
            } else {
                continue;
            };
            match result {
                Ok(found) => {
                    for der in found.roots {
                        self.push(der);
                    }
                }
                Err(err) => debug!("Skipping system certificates at {}: {}", path.display(), err),
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn build(self) -> TrustStore {
        TrustStore { roots: self.roots }
    }
}
