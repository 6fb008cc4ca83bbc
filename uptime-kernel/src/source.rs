//! Client for the upstream node list.
//!
//! The endpoint answers `GET` with `[{"key": "...", "start_time": 1234}, ...]`,
//! one entry per node currently seen, `start_time` being the seconds since
//! that node's process started.

use crate::models::Observation;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot load data from {endpoint}: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream answered with status {0}")]
    Status(u16),
    #[error("malformed node list: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct SourceClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| SourceError::Request { endpoint: config.endpoint.clone(), source })?;
        Ok(Self { http, endpoint: config.endpoint.clone() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn fetch(&self) -> Result<Vec<Observation>, SourceError> {
        let request_error = |source| SourceError::Request { endpoint: self.endpoint.clone(), source };

        let response = self.http.get(&self.endpoint).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(request_error)?;
        let observations: Vec<Observation> = serde_json::from_slice(&body)?;
        debug!(endpoint = %self.endpoint, nodes = observations.len(), "fetched node list");
        Ok(observations)
    }
}
