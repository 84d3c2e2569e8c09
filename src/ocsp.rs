//! OCSP (Online Certificate Status Protocol) data model and DER codec.
//!
//! Requests and responses follow RFC 6960. Decoding produces an owned
//! [`ParsedOcspResponse`] so the validator never holds borrowed ASN.1 state.

use crate::backend::SignatureAlgorithm;
use crate::error::DecodeError;
use crate::identity::{normalize_serial, CertIdentity, HashAlgorithm};
use der::asn1::{Null, ObjectIdentifier, OctetString};
use der::{Any, Decode, Encode};
use spki::AlgorithmIdentifierOwned;
use x509_cert::serial_number::SerialNumber;
use x509_ocsp::{BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, Request, TbsRequest, Version};

/// id-pkix-ocsp-basic
const OCSP_BASIC_RESPONSE_OID: &str = "1.3.6.1.5.5.7.48.1.1";

/// OCSP certificate status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspStatus {
    /// Certificate is valid and not revoked
    Good,
    /// Certificate has been revoked
    Revoked {
        revocation_time: i64,
        reason: RevocationReason,
    },
    /// Certificate status is unknown
    Unknown,
}

/// Reasons for certificate revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CACompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCRL,
    PrivilegeWithdrawn,
    AACompromise,
}

impl From<u8> for RevocationReason {
    fn from(value: u8) -> Self {
        match value {
            1 => RevocationReason::KeyCompromise,
            2 => RevocationReason::CACompromise,
            3 => RevocationReason::AffiliationChanged,
            4 => RevocationReason::Superseded,
            5 => RevocationReason::CessationOfOperation,
            6 => RevocationReason::CertificateHold,
            8 => RevocationReason::RemoveFromCRL,
            9 => RevocationReason::PrivilegeWithdrawn,
            10 => RevocationReason::AACompromise,
            _ => RevocationReason::Unspecified,
        }
    }
}

/// OCSPResponseStatus (RFC 6960 section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl ResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResponseStatus::Successful),
            1 => Some(ResponseStatus::MalformedRequest),
            2 => Some(ResponseStatus::InternalError),
            3 => Some(ResponseStatus::TryLater),
            5 => Some(ResponseStatus::SigRequired),
            6 => Some(ResponseStatus::Unauthorized),
            _ => None,
        }
    }
}

/// One SingleResponse of a BasicOCSPResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertIdentity,
    pub status: OcspStatus,
    pub this_update: i64,
    pub next_update: Option<i64>,
}

/// Decoded OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOcspResponse {
    pub status: ResponseStatus,
    pub responses: Vec<SingleResponse>,
    /// DER of ResponseData, the bytes covered by `signature`.
    pub tbs_response_data: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    /// Certificates embedded by a delegated responder, DER-encoded.
    pub responder_certs: Vec<Vec<u8>>,
}

impl ParsedOcspResponse {
    /// Find the SingleResponse that answers for `cert_id`.
    ///
    /// When the responder hashed with a different algorithm only the serial
    /// number can be compared.
    pub fn find_response(&self, cert_id: &CertIdentity) -> Option<&SingleResponse> {
        self.responses.iter().find(|single| {
            if single.cert_id.serial_number != cert_id.serial_number {
                return false;
            }
            single.cert_id.hash_algorithm != cert_id.hash_algorithm
                || (single.cert_id.issuer_name_hash == cert_id.issuer_name_hash
                    && single.cert_id.issuer_key_hash == cert_id.issuer_key_hash)
        })
    }
}

fn der_error(context: &str, err: impl std::fmt::Display) -> DecodeError {
    DecodeError(format!("{}: {}", context, err))
}

/// Serial numbers are positive INTEGERs; restore the sign octet if needed.
fn serial_for_der(serial: &[u8]) -> Vec<u8> {
    let mut bytes = normalize_serial(serial);
    if bytes.first().map_or(true, |b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    bytes
}

fn to_asn1_cert_id(cert_id: &CertIdentity) -> Result<CertId, DecodeError> {
    let oid = ObjectIdentifier::new(cert_id.hash_algorithm.oid()).map_err(|e| der_error("hash algorithm OID", e))?;
    Ok(CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid,
            parameters: Some(Any::from(Null)),
        },
        issuer_name_hash: OctetString::new(cert_id.issuer_name_hash.clone()).map_err(|e| der_error("issuer name hash", e))?,
        issuer_key_hash: OctetString::new(cert_id.issuer_key_hash.clone()).map_err(|e| der_error("issuer key hash", e))?,
        serial_number: SerialNumber::new(&serial_for_der(&cert_id.serial_number)).map_err(|e| der_error("serial number", e))?,
    })
}

fn from_asn1_cert_id(cert_id: &CertId) -> Option<CertIdentity> {
    let hash_algorithm = HashAlgorithm::from_oid(&cert_id.hash_algorithm.oid.to_string()).ok()?;
    Some(CertIdentity {
        hash_algorithm,
        issuer_name_hash: cert_id.issuer_name_hash.as_bytes().to_vec(),
        issuer_key_hash: cert_id.issuer_key_hash.as_bytes().to_vec(),
        serial_number: normalize_serial(cert_id.serial_number.as_bytes()),
    })
}

/// Encode the CertID alone.
pub fn encode_cert_id(cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
    to_asn1_cert_id(cert_id)?.to_der().map_err(|e| der_error("CertID encoding", e))
}

/// Build an unsigned, nonce-less OCSPRequest for one certificate.
pub fn encode_request(cert_id: &CertIdentity) -> Result<Vec<u8>, DecodeError> {
    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: to_asn1_cert_id(cert_id)?,
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
        optional_signature: None,
    };
    request.to_der().map_err(|e| der_error("OCSPRequest encoding", e))
}

/// Decode an OCSPResponse. Only the id-pkix-ocsp-basic response type is understood.
pub fn decode_response(der: &[u8]) -> Result<ParsedOcspResponse, DecodeError> {
    let response = OcspResponse::from_der(der).map_err(|e| der_error("OCSPResponse", e))?;
    let status = ResponseStatus::from_u8(response.response_status as u8)
        .ok_or_else(|| DecodeError("unknown OCSP response status".to_string()))?;

    let bytes = match response.response_bytes {
        Some(bytes) => bytes,
        None if status != ResponseStatus::Successful => {
            return Ok(ParsedOcspResponse {
                status,
                responses: Vec::new(),
                tbs_response_data: Vec::new(),
                signature_algorithm: SignatureAlgorithm::Unsupported(String::new()),
                signature: Vec::new(),
                responder_certs: Vec::new(),
            });
        }
        None => return Err(DecodeError("successful OCSP response without responseBytes".to_string())),
    };

    if bytes.response_type.to_string() != OCSP_BASIC_RESPONSE_OID {
        return Err(DecodeError(format!("unsupported OCSP response type {}", bytes.response_type)));
    }

    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes()).map_err(|e| der_error("BasicOCSPResponse", e))?;
    let tbs_response_data = basic
        .tbs_response_data
        .to_der()
        .map_err(|e| der_error("ResponseData re-encoding", e))?;

    let mut responses = Vec::new();
    for single in &basic.tbs_response_data.responses {
        let Some(cert_id) = from_asn1_cert_id(&single.cert_id) else {
            continue;
        };
        let status = match &single.cert_status {
            CertStatus::Good(_) => OcspStatus::Good,
            CertStatus::Revoked(info) => OcspStatus::Revoked {
                revocation_time: info.revocation_time.0.to_unix_duration().as_secs() as i64,
                reason: info
                    .revocation_reason
                    .map(|reason| RevocationReason::from(reason as u8))
                    .unwrap_or(RevocationReason::Unspecified),
            },
            CertStatus::Unknown(_) => OcspStatus::Unknown,
        };
        responses.push(SingleResponse {
            cert_id,
            status,
            this_update: single.this_update.0.to_unix_duration().as_secs() as i64,
            next_update: single.next_update.as_ref().map(|t| t.0.to_unix_duration().as_secs() as i64),
        });
    }

    let mut responder_certs = Vec::new();
    for cert in basic.certs.iter().flatten() {
        responder_certs.push(cert.to_der().map_err(|e| der_error("responder certificate", e))?);
    }

    Ok(ParsedOcspResponse {
        status,
        responses,
        tbs_response_data,
        signature_algorithm: SignatureAlgorithm::from_oid(&basic.signature_algorithm.oid.to_string()),
        signature: basic.signature.raw_bytes().to_vec(),
        responder_certs,
    })
}
