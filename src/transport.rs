//! HTTP collaborator used to reach OCSP responders and cache servers.

use crate::error::TransportError;
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use std::time::Duration;

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// A single HTTP exchange: where, how, what, and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<&'static str>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        FetchRequest {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            content_type: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, content_type: &'static str, body: Vec<u8>, timeout: Duration) -> Self {
        FetchRequest {
            url: url.into(),
            method: HttpMethod::Post,
            body: Some(body),
            content_type: Some(content_type),
            timeout,
        }
    }
}

/// Network capability consumed by the validator.
///
/// Implementations return the response body on a 2xx answer and a
/// [`TransportError`] for everything else, timeouts included.
pub trait OcspTransport: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError>;
}

/// Blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("ocspcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(HttpTransport { client })
    }

    fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if err.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else if err.is_builder() {
            TransportError::InvalidUrl(url.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl OcspTransport for HttpTransport {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError> {
        debug!("{} {} (timeout {:?})", request.method, request.url, request.timeout);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        builder = builder.timeout(request.timeout);
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .map_err(|e| Self::classify(&request.url, request.timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .map_err(|e| Self::classify(&request.url, request.timeout, e))?;
        Ok(body.to_vec())
    }
}
