use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::batch::SinkFailurePolicy;
use crate::qa::RetryPolicy;

const ENV_PREFIX: &str = "TRIALQA";
const DEFAULT_CONFIG_FILE: &str = "trial_qa";

/// Runtime settings: defaults ← `trial_qa.toml` ← `TRIALQA_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub gemini_base_url: String,
    pub records_base_url: String,
    pub output_dir: PathBuf,
    pub folder_name: String,
    pub file_prefix: String,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub sink_failure: SinkFailurePolicy,
    pub db_path: PathBuf,
    pub cohorts_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            gemini_api_key: None,
            model: "gemini-1.5-pro".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            records_base_url: "https://clinicaltrials.gov/api/v2/studies".to_string(),
            output_dir: PathBuf::from("output"),
            folder_name: "clinical_trials_custom_links_gemini".to_string(),
            file_prefix: "clinical_trials".to_string(),
            max_attempts: 10_000,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            request_timeout_secs: 120,
            sink_failure: SinkFailurePolicy::Abort,
            db_path: PathBuf::from("data/trial_qa.sqlite"),
            cohorts_path: PathBuf::from("data/cohorts.toml"),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        if settings.gemini_api_key.is_none() {
            settings.gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        }
        settings.gemini_api_key = settings.gemini_api_key.filter(|k| !k.trim().is_empty());
        Ok(settings)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Folder all documents of this run land in.
    pub fn output_folder(&self) -> PathBuf {
        self.output_dir.join(&self.folder_name)
    }
}
