//! Runtime configuration for journal clients.
//!
//! Values come from the environment. Resolution goes through a lookup
//! function so callers (and tests) can supply any key/value source.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{ControllerSettings, DEFAULT_NAMESPACE};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::util::{compact_text, normalize_text_option};

pub const ENV_FIREBASE_CONFIG: &str = "JOURNAL_FIREBASE_CONFIG";
pub const ENV_APP_ID: &str = "JOURNAL_APP_ID";
pub const ENV_INITIAL_AUTH_TOKEN: &str = "JOURNAL_INITIAL_AUTH_TOKEN";
pub const ENV_NAMESPACE: &str = "JOURNAL_NAMESPACE";
pub const ENV_POLL_INTERVAL_SECS: &str = "JOURNAL_POLL_INTERVAL_SECS";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Public Firebase web config. Only the fields the journal uses are read;
/// the rest of the blob (auth domain, bucket, ...) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub project_id: String,
}

impl FirebaseConfig {
    /// Parse the JSON blob and require both credentials.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload).map_err(|error| {
            Error::Configuration(format!(
                "{ENV_FIREBASE_CONFIG} is not valid JSON: {}",
                compact_text(&error.to_string())
            ))
        })?;

        let api_key = normalize_text_option(Some(config.api_key))
            .ok_or_else(|| Error::Configuration("Firebase apiKey is missing".to_string()))?;
        let project_id = normalize_text_option(Some(config.project_id))
            .ok_or_else(|| Error::Configuration("Firebase projectId is missing".to_string()))?;
        Ok(Self {
            api_key,
            project_id,
        })
    }

    /// Read only the Firebase blob from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        normalize_text_option(lookup(ENV_FIREBASE_CONFIG))
            .ok_or_else(|| Error::Configuration(format!("{ENV_FIREBASE_CONFIG} is not set")))
            .and_then(|payload| Self::parse(&payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    pub firebase: FirebaseConfig,
    pub app_id: String,
    pub initial_auth_token: Option<String>,
    pub namespace: String,
    pub poll_interval: Duration,
}

impl JournalConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| normalize_text_option(lookup(key));

        let firebase = FirebaseConfig::from_lookup(&lookup)?;
        let app_id = read(ENV_APP_ID)
            .ok_or_else(|| Error::Configuration(format!("{ENV_APP_ID} is not set")))?;
        if app_id.contains('/') {
            return Err(Error::Configuration(format!(
                "{ENV_APP_ID} must not contain '/'"
            )));
        }

        let poll_interval = match read(ENV_POLL_INTERVAL_SECS) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    Error::Configuration(format!(
                        "{ENV_POLL_INTERVAL_SECS} must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        Ok(Self {
            firebase,
            app_id,
            initial_auth_token: read(ENV_INITIAL_AUTH_TOKEN),
            namespace: read(ENV_NAMESPACE).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            poll_interval,
        })
    }

    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            app_id: self.app_id.clone(),
            namespace: self.namespace.clone(),
            initial_auth_token: self.initial_auth_token.clone(),
            retry: RetryPolicy::default(),
        }
    }
}
