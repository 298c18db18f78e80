use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use thiserror::Error;

/// Everything that can abort one ingestion run.  Per-record problems are
/// recovered locally (record skipped) and never show up here.
#[derive(Debug, Error)]
pub enum LogsError {
    /// Network or HTTP-status failure while talking to the server.
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Body is not the JSON envelope we expect.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The server itself flagged the request as failed.
    #[error("server responded with an error: {0}")]
    ServerReported(String),
    /// The write transaction could not be completed.
    #[error("failed to save entries: {0}")]
    Persistence(#[from] duckdb::Error),
}

/// Send a GET request, return the response body.
pub trait HttpGetter {
    fn get_content(&self, url: &str) -> Result<Vec<u8>, LogsError>;
}

pub struct ReqwestGetter {
    client: Client,
}

impl ReqwestGetter {
    pub fn new() -> ReqwestGetter {
        ReqwestGetter {
            client: Client::new(),
        }
    }
}

impl Default for ReqwestGetter {
    fn default() -> Self {
        ReqwestGetter::new()
    }
}

impl HttpGetter for ReqwestGetter {
    /// One attempt only.  A non-2xx status is a transport failure.
    fn get_content(&self, url: &str) -> Result<Vec<u8>, LogsError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()?
            .error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}
