use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

const UNKNOWN_TITLE: &str = "Unknown";

/// A fetched study: its display title and the full record, pretty-printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub title: String,
    pub raw: String,
}

/// Where trial records come from.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn fetch(&self, trial_id: &str) -> Result<TrialRecord, FetchError>;
}

/// ClinicalTrials.gov v2 studies API.
pub struct ClinicalTrialsClient {
    client: reqwest::Client,
    base_url: String,
}

impl ClinicalTrialsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ClinicalTrialsClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RecordSource for ClinicalTrialsClient {
    async fn fetch(&self, trial_id: &str) -> Result<TrialRecord, FetchError> {
        let url = format!("{}/{}", self.base_url, trial_id);
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_record(&body)
    }
}

/// Decode a study body into its title and the 2-space indented record text
/// the section filter runs over.
pub fn parse_record(body: &str) -> Result<TrialRecord, FetchError> {
    let study: Value = serde_json::from_str(body).map_err(|e| FetchError::Body(e.to_string()))?;
    let title = study
        .pointer("/protocolSection/identificationModule/briefTitle")
        .and_then(|t| t.as_str())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();
    let raw = serde_json::to_string_pretty(&study).map_err(|e| FetchError::Body(e.to_string()))?;
    Ok(TrialRecord { title, raw })
}
