//! Test fixtures: generated certificate chains, a scripted OCSP backend and
//! an in-memory transport.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use der::asn1::{BitString, GeneralizedTime, ObjectIdentifier};
use der::{Decode, Encode};
use ocspcheck::{
    encode_cert_id, encode_request, unix_now, CertIdentity, Certificate, CryptoBackend, DecodeError, FetchRequest,
    HashAlgorithm, OcspConfig, OcspStatus, OcspTransport, ParsedOcspResponse, PublicKey, ResponseStatus, RetryConfig,
    RevocationReason, SignatureAlgorithm, SingleResponse, TransportError, UnsupportedAlgorithmError, X509Backend,
};
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa, KeyPair,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde::{Deserialize, Serialize};
use spki::AlgorithmIdentifierOwned;
use std::sync::Mutex;
use std::time::Duration;
use x509_cert::name::Name;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspResponse, ResponderId, ResponseData,
    RevokedInfo, Version,
};

pub const HOSTNAME: &str = "acct.us-east-1.snowflakecomputing.com";
pub const RESPONDER_URL: &str = "http://ocsp.test.example/";

const SCRIPTED_SIGNATURE: &[u8] = b"scripted-signature";
const BAD_SIGNATURE: &[u8] = b"bad-signature";

/// id-pe-authorityInfoAccess
const AIA_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];

/// AuthorityInfoAccessSyntax with a single id-ad-ocsp URI.
fn aia_ocsp(url: &str) -> Vec<u8> {
    let url = url.as_bytes();
    let mut access = vec![0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01];
    access.push(0x86);
    access.push(url.len() as u8);
    access.extend_from_slice(url);

    let mut description = vec![0x30, access.len() as u8];
    description.extend(access);
    let mut syntax = vec![0x30, description.len() as u8];
    syntax.extend(description);
    syntax
}

fn params(common_name: &str, is_ca: bool, ocsp_url: Option<&str>) -> CertificateParams {
    let sans = if is_ca { Vec::new() } else { vec![common_name.to_string()] };
    let mut params = CertificateParams::new(sans).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    if is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    if let Some(url) = ocsp_url {
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(AIA_OID, aia_ocsp(url)));
    }
    params
}

/// Root -> intermediate -> leaf, DER encoded, with the CA keys kept for
/// signing OCSP responses.
pub struct TestChain {
    pub root: Vec<u8>,
    pub intermediate: Vec<u8>,
    pub leaf: Vec<u8>,
    root_cert: rcgen::Certificate,
    root_key: KeyPair,
    intermediate_cert: rcgen::Certificate,
    intermediate_key: KeyPair,
}

impl TestChain {
    /// Intermediate and leaf carry `ocsp_url` in their AIA extension.
    pub fn new(ocsp_url: Option<&str>) -> Self {
        let root_key = KeyPair::generate().unwrap();
        let root_cert = params("Test Root CA", true, None).self_signed(&root_key).unwrap();

        let intermediate_key = KeyPair::generate().unwrap();
        let intermediate_cert = params("Test Intermediate CA", true, ocsp_url)
            .signed_by(&intermediate_key, &root_cert, &root_key)
            .unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = params("leaf.test.example", false, ocsp_url)
            .signed_by(&leaf_key, &intermediate_cert, &intermediate_key)
            .unwrap();

        TestChain {
            root: root_cert.der().to_vec(),
            intermediate: intermediate_cert.der().to_vec(),
            leaf: leaf.der().to_vec(),
            root_cert,
            root_key,
            intermediate_cert,
            intermediate_key,
        }
    }

    pub fn with_responder() -> Self {
        TestChain::new(Some(RESPONDER_URL))
    }

    /// Leaf first, as a server presents it.
    pub fn presented(&self) -> Vec<Vec<u8>> {
        vec![self.leaf.clone(), self.intermediate.clone(), self.root.clone()]
    }

    fn identity(issuer: &[u8], subject: &[u8]) -> CertIdentity {
        let backend = X509Backend::new();
        let issuer = backend.decode_certificate(issuer).unwrap();
        let subject = backend.decode_certificate(subject).unwrap();
        CertIdentity::compute(&issuer, &subject, HashAlgorithm::Sha1)
    }

    pub fn leaf_id(&self) -> CertIdentity {
        TestChain::identity(&self.intermediate, &self.leaf)
    }

    pub fn intermediate_id(&self) -> CertIdentity {
        TestChain::identity(&self.root, &self.intermediate)
    }

    pub fn ids(&self) -> Vec<CertIdentity> {
        vec![self.leaf_id(), self.intermediate_id()]
    }

    /// Signer for responses about the leaf: the intermediate CA itself.
    pub fn intermediate_signer(&self) -> Signer {
        Signer::new(&self.intermediate_key, &self.intermediate)
    }

    /// Signer for responses about the intermediate: the root CA itself.
    pub fn root_signer(&self) -> Signer {
        Signer::new(&self.root_key, &self.root)
    }

    /// Delegated OCSP responder certificate issued by the intermediate CA.
    pub fn delegate_of_intermediate(&self, expired: bool) -> Signer {
        self.delegate(&self.intermediate_cert, &self.intermediate_key, expired)
    }

    /// Delegated responder issued by the root, which did not issue the leaf.
    pub fn delegate_of_root(&self) -> Signer {
        self.delegate(&self.root_cert, &self.root_key, false)
    }

    fn delegate(&self, issuer: &rcgen::Certificate, issuer_key: &KeyPair, expired: bool) -> Signer {
        let key = KeyPair::generate().unwrap();
        let mut params = params("ocsp-responder.test.example", false, None);
        if expired {
            params.not_before = date_time_ymd(2001, 1, 1);
            params.not_after = date_time_ymd(2002, 1, 1);
        }
        let cert = params.signed_by(&key, issuer, issuer_key).unwrap();
        let mut signer = Signer::new(&key, cert.der());
        signer.embedded = Some(cert.der().to_vec());
        signer
    }
}

/// ECDSA P-256 key plus the certificate naming the responder.
pub struct Signer {
    key: EcdsaKeyPair,
    responder_name: Vec<u8>,
    embedded: Option<Vec<u8>>,
}

impl Signer {
    fn new(key: &KeyPair, cert_der: &[u8]) -> Self {
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der(), &SystemRandom::new())
            .unwrap();
        let cert = X509Backend::new().decode_certificate(cert_der).unwrap();
        Signer {
            key,
            responder_name: cert.subject,
            embedded: None,
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(&SystemRandom::new(), message).unwrap().as_ref().to_vec()
    }
}

fn generalized_time(unix: i64) -> OcspGeneralizedTime {
    OcspGeneralizedTime(GeneralizedTime::from_unix_duration(Duration::from_secs(unix as u64)).unwrap())
}

/// Status carried by a DER response, with the revocation time if any.
#[derive(Debug, Clone, Copy)]
pub enum DerStatus {
    Good,
    Revoked(i64),
    Unknown,
}

/// A real DER OCSPResponse with an ECDSA-signed BasicOCSPResponse.
pub struct DerResponse {
    pub status: DerStatus,
    pub cert_id: CertIdentity,
    pub this_update: i64,
    pub next_update: Option<i64>,
}

impl DerResponse {
    /// Issued an hour ago, valid for a day.
    pub fn new(status: DerStatus, cert_id: CertIdentity) -> Self {
        let now = unix_now();
        DerResponse {
            status,
            cert_id,
            this_update: now - 3600,
            next_update: Some(now + 86400),
        }
    }

    pub fn signed_by(&self, signer: &Signer) -> Vec<u8> {
        let cert_status = match self.status {
            DerStatus::Good => CertStatus::good(),
            DerStatus::Revoked(at) => CertStatus::Revoked(RevokedInfo {
                revocation_time: generalized_time(at),
                revocation_reason: None,
            }),
            DerStatus::Unknown => CertStatus::unknown(),
        };
        let cert_id = CertId::from_der(&encode_cert_id(&self.cert_id).unwrap()).unwrap();
        let tbs_response_data = ResponseData {
            version: Version::V1,
            responder_id: ResponderId::ByName(Name::from_der(&signer.responder_name).unwrap()),
            produced_at: generalized_time(unix_now()),
            responses: vec![x509_ocsp::SingleResponse {
                cert_id,
                cert_status,
                this_update: generalized_time(self.this_update),
                next_update: self.next_update.map(generalized_time),
                single_extensions: None,
            }],
            response_extensions: None,
        };
        let signature = signer.sign(&tbs_response_data.to_der().unwrap());
        let certs = signer
            .embedded
            .as_ref()
            .map(|der| vec![x509_cert::Certificate::from_der(der).unwrap()]);

        let basic = BasicOcspResponse {
            tbs_response_data,
            signature_algorithm: AlgorithmIdentifierOwned {
                // ecdsa-with-SHA256
                oid: ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2"),
                parameters: None,
            },
            signature: BitString::from_bytes(&signature).unwrap(),
            certs,
        };
        OcspResponse::successful(basic).unwrap().to_der().unwrap()
    }
}

/// Good responses for the whole chain, each signed by the certificate's issuer.
pub fn der_good(chain: &TestChain) -> Vec<(CertIdentity, Vec<u8>)> {
    vec![
        (
            chain.leaf_id(),
            DerResponse::new(DerStatus::Good, chain.leaf_id()).signed_by(&chain.intermediate_signer()),
        ),
        (
            chain.intermediate_id(),
            DerResponse::new(DerStatus::Good, chain.intermediate_id()).signed_by(&chain.root_signer()),
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptedStatus {
    Good,
    Revoked,
    Unknown,
}

/// Stand-in for a signed BasicOCSPResponse, carried as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedResponse {
    pub status: ScriptedStatus,
    pub cert_ids: Vec<CertIdentity>,
    pub this_update: i64,
    pub next_update: Option<i64>,
    pub signed: bool,
}

impl ScriptedResponse {
    /// Covers `cert_ids`, issued an hour ago and valid for a day.
    pub fn new(status: ScriptedStatus, cert_ids: Vec<CertIdentity>) -> Self {
        let now = unix_now();
        ScriptedResponse {
            status,
            cert_ids,
            this_update: now - 3600,
            next_update: Some(now + 86400),
            signed: true,
        }
    }

    pub fn expired(mut self) -> Self {
        let now = unix_now();
        self.this_update = now - 10 * 86400;
        self.next_update = Some(now - 5 * 86400);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }
}

pub fn good(chain: &TestChain) -> Vec<u8> {
    ScriptedResponse::new(ScriptedStatus::Good, chain.ids()).to_bytes()
}

pub fn revoked(chain: &TestChain) -> Vec<u8> {
    ScriptedResponse::new(ScriptedStatus::Revoked, chain.ids()).to_bytes()
}

/// Real certificate handling, scripted OCSP responses.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    inner: X509Backend,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        ScriptedBackend::default()
    }
}

impl CryptoBackend for ScriptedBackend {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, DecodeError> {
        self.inner.decode_certificate(der)
    }

    fn verify_signature(
        &self,
        algorithm: &SignatureAlgorithm,
        signature: &[u8],
        public_key: &PublicKey,
        signed_bytes: &[u8],
    ) -> Result<bool, UnsupportedAlgorithmError> {
        match signature {
            SCRIPTED_SIGNATURE => Ok(true),
            BAD_SIGNATURE => Ok(false),
            _ => self.inner.verify_signature(algorithm, signature, public_key, signed_bytes),
        }
    }

    fn parse_ocsp_response(&self, der: &[u8]) -> Result<ParsedOcspResponse, DecodeError> {
        let scripted: ScriptedResponse =
            serde_json::from_slice(der).map_err(|e| DecodeError(format!("not a scripted response: {}", e)))?;
        let status = match scripted.status {
            ScriptedStatus::Good => OcspStatus::Good,
            ScriptedStatus::Revoked => OcspStatus::Revoked {
                revocation_time: scripted.this_update,
                reason: RevocationReason::KeyCompromise,
            },
            ScriptedStatus::Unknown => OcspStatus::Unknown,
        };
        let responses = scripted
            .cert_ids
            .iter()
            .map(|cert_id| SingleResponse {
                cert_id: cert_id.clone(),
                status: status.clone(),
                this_update: scripted.this_update,
                next_update: scripted.next_update,
            })
            .collect();
        let signature = if scripted.signed { SCRIPTED_SIGNATURE } else { BAD_SIGNATURE };

        Ok(ParsedOcspResponse {
            status: ResponseStatus::Successful,
            responses,
            tbs_response_data: der.to_vec(),
            signature_algorithm: SignatureAlgorithm::Ed25519,
            signature: signature.to_vec(),
            responder_certs: Vec::new(),
        })
    }

    fn encode_ocsp_request(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
        self.inner.encode_ocsp_request(cert_id)
    }

    fn encode_cert_id(&self, cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
        self.inner.encode_cert_id(cert_id)
    }
}

type Responder = Box<dyn Fn(&FetchRequest) -> Result<Vec<u8>, TransportError> + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct MockTransport {
    respond: Responder,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockTransport {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&FetchRequest) -> Result<Vec<u8>, TransportError> + Send + Sync + 'static,
    {
        MockTransport {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Same body for every request.
    pub fn answering(body: Vec<u8>) -> Self {
        MockTransport::new(move |_| Ok(body.clone()))
    }

    /// Every request fails to connect.
    pub fn offline() -> Self {
        MockTransport::new(|request| {
            Err(TransportError::Connect {
                url: request.url.clone(),
                reason: "connection refused".to_string(),
            })
        })
    }

    /// Answers each OCSP request with the response prepared for its
    /// certificate, over GET or POST; anything else is a 404.
    pub fn per_certificate(answers: Vec<(CertIdentity, Vec<u8>)>) -> Self {
        let answers: Vec<(Vec<u8>, Vec<u8>)> = answers
            .into_iter()
            .map(|(cert_id, body)| (encode_request(&cert_id).unwrap(), body))
            .collect();
        MockTransport::new(move |request| {
            let found = answers.iter().find(|(ocsp_request, _)| {
                request.body.as_deref() == Some(ocsp_request.as_slice())
                    || request.url.ends_with(&STANDARD.encode(ocsp_request))
            });
            match found {
                Some((_, body)) => Ok(body.clone()),
                None => Err(TransportError::Status {
                    url: request.url.clone(),
                    status: 404,
                }),
            }
        })
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl OcspTransport for MockTransport {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

/// No persistence, no retries, no cache server.
pub fn test_config() -> OcspConfig {
    OcspConfig {
        persist_cache: false,
        use_cache_server: false,
        retry: RetryConfig::no_retry(),
        ..OcspConfig::default()
    }
}
