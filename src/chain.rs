//! Issuer/subject pairing for a presented certificate chain.

use crate::backend::{Certificate, CryptoBackend};
use crate::error::{ErrorCode, RevocationCheckError};
use crate::trust_store::TrustStore;
use log::debug;
use std::collections::HashSet;

/// A certificate to check together with the certificate that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPair {
    pub issuer: Certificate,
    pub subject: Certificate,
}

/// Builds the list of (issuer, subject) pairs whose revocation status must be checked.
pub struct ChainBuilder<'a> {
    backend: &'a dyn CryptoBackend,
    trust_store: &'a TrustStore,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(backend: &'a dyn CryptoBackend, trust_store: &'a TrustStore) -> Self {
        ChainBuilder { backend, trust_store }
    }

    /// Pair every non-self-signed certificate in `chain` with its issuer.
    ///
    /// Issuers are looked up in the chain first and then in the trust store.
    /// Self-signed roots end the walk and are not checked themselves. A
    /// certificate whose issuer cannot be found fails the whole chain.
    pub fn pairs(&self, chain: &[Vec<u8>]) -> Result<Vec<CertPair>, RevocationCheckError> {
        if chain.is_empty() {
            return Err(RevocationCheckError::new(
                ErrorCode::ResponseDecodeFailure,
                "certificate chain is empty",
            ));
        }

        let mut certs = Vec::with_capacity(chain.len());
        for der in chain {
            certs.push(self.backend.decode_certificate(der)?);
        }

        let mut roots: Option<Vec<Certificate>> = None;
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        for subject in &certs {
            if !seen.insert(subject.der.clone()) {
                continue;
            }
            if subject.is_self_signed() {
                debug!("Stopping at self-signed certificate {}", subject.subject_display);
                continue;
            }

            let issuer = match self.find_issuer(subject, &certs) {
                Some(issuer) => issuer,
                None => {
                    let roots = roots.get_or_insert_with(|| self.decode_roots());
                    self.find_issuer(subject, roots)
                        .ok_or_else(|| RevocationCheckError::ca_not_found(&subject.subject_display))?
                }
            };

            pairs.push(CertPair {
                issuer,
                subject: subject.clone(),
            });
        }

        Ok(pairs)
    }

    fn decode_roots(&self) -> Vec<Certificate> {
        self.trust_store
            .roots()
            .iter()
            .filter_map(|der| self.backend.decode_certificate(der).ok())
            .collect()
    }

    /// Name match first; among several candidates prefer the one whose key
    /// verifies the subject's signature.
    fn find_issuer(&self, subject: &Certificate, candidates: &[Certificate]) -> Option<Certificate> {
        let named: Vec<&Certificate> = candidates
            .iter()
            .filter(|candidate| candidate.der != subject.der && subject.is_issued_by(candidate))
            .collect();

        let verified = named.iter().find(|candidate| {
            self.backend
                .verify_signature(
                    &subject.signature_algorithm,
                    &subject.signature,
                    &candidate.public_key,
                    &subject.tbs,
                )
                .unwrap_or(false)
        });

        verified.or(named.first()).map(|issuer| (*issuer).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::X509Backend;
    use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};

    struct Chain {
        root: Vec<u8>,
        intermediate: Vec<u8>,
        leaf: Vec<u8>,
    }

    fn ca_params(name: &str) -> CertificateParams {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
    }

    fn three_level_chain() -> Chain {
        let root_key = KeyPair::generate().unwrap();
        let root = ca_params("Test Root").self_signed(&root_key).unwrap();

        let int_key = KeyPair::generate().unwrap();
        let intermediate = ca_params("Test Intermediate").signed_by(&int_key, &root, &root_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec!["leaf.example.com".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &intermediate, &int_key)
            .unwrap();

        Chain {
            root: root.der().to_vec(),
            intermediate: intermediate.der().to_vec(),
            leaf: leaf.der().to_vec(),
        }
    }

    #[test]
    fn test_full_chain_pairs() {
        let chain = three_level_chain();
        let backend = X509Backend::new();
        let store = TrustStore::empty();
        let pairs = ChainBuilder::new(&backend, &store)
            .pairs(&[chain.leaf.clone(), chain.intermediate.clone(), chain.root.clone()])
            .unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].subject.der, chain.leaf);
        assert_eq!(pairs[0].issuer.der, chain.intermediate);
        assert_eq!(pairs[1].subject.der, chain.intermediate);
        assert_eq!(pairs[1].issuer.der, chain.root);
    }

    #[test]
    fn test_root_from_trust_store() {
        let chain = three_level_chain();
        let backend = X509Backend::new();
        let store = TrustStore::builder().add_der_data(chain.root.clone()).build();
        let pairs = ChainBuilder::new(&backend, &store)
            .pairs(&[chain.leaf.clone(), chain.intermediate.clone()])
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].issuer.der, chain.root);
    }

    #[test]
    fn test_incomplete_chain_is_ca_not_found() {
        let chain = three_level_chain();
        let backend = X509Backend::new();
        let store = TrustStore::empty();
        let err = ChainBuilder::new(&backend, &store)
            .pairs(&[chain.leaf, chain.intermediate])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CaCertificateNotFound);
        assert!(err.message.contains("CA certificate is NOT found"));
    }

    #[test]
    fn test_empty_chain_is_error() {
        let backend = X509Backend::new();
        let store = TrustStore::empty();
        assert!(ChainBuilder::new(&backend, &store).pairs(&[]).is_err());
    }
}
