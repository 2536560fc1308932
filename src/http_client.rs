use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use thiserror::Error;

static CLIENT: OnceCell<Client> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http {status}")]
    Status { status: u16 },
    #[error("failed reading body: {0}")]
    Body(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::Body(_) | FetchError::InvalidUrl { .. } | FetchError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

// Shared across the fetch pool's worker threads.
pub trait PageFetcher: Sync {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: &'static Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        resp.text().map_err(|err| FetchError::Body(err.to_string()))
    }
}

// The first caller fixes the timeout for the rest of the process.
pub fn http_client(timeout: Duration) -> Result<&'static Client, FetchError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Other(format!("failed to build http client: {err}")))
    })
}
