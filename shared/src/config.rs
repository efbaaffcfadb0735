use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{HttpError, PositionOptions, ValidatedUrl};

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const DEFAULT_CLIENT_ID: &str = "truckassist-intake/0.1";
pub const DEFAULT_SUBMISSION_ENDPOINT: &str = "https://api.truckassist.example/v1/requests";
pub const DEFAULT_GEOCODER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field}: {source}")]
    Endpoint {
        field: &'static str,
        #[source]
        source: HttpError,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must be > 0")]
    ZeroTimeout(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Sent as the `accept-language` query parameter.
    pub language: String,
    pub accept_language: String,
    /// Identifies this client to the geocoding service.
    pub client_id: String,
    /// How long to wait for an address before keeping the bare coordinates.
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_geocoder_timeout_ms() -> u64 {
    DEFAULT_GEOCODER_TIMEOUT_MS
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODER_ENDPOINT.into(),
            language: DEFAULT_LANGUAGE.into(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            timeout_ms: DEFAULT_GEOCODER_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub endpoint: String,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SUBMISSION_ENDPOINT.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub position: PositionOptions,
}

impl FormConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::new(self.geocoder.endpoint.as_str()).map_err(|source| {
            ConfigError::Endpoint {
                field: "geocoder.endpoint",
                source,
            }
        })?;
        ValidatedUrl::new(self.submission.endpoint.as_str()).map_err(|source| {
            ConfigError::Endpoint {
                field: "submission.endpoint",
                source,
            }
        })?;
        if self.geocoder.language.trim().is_empty() {
            return Err(ConfigError::Empty("geocoder.language"));
        }
        if self.geocoder.client_id.trim().is_empty() {
            return Err(ConfigError::Empty("geocoder.client_id"));
        }
        if self.geocoder.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("geocoder.timeout_ms"));
        }
        if self.position.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("position.timeout_ms"));
        }
        Ok(())
    }
}
