use crate::config::{BackendConfig, Credentials};
use crate::encoder::DataUri;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

pub const FALLBACK_MESSAGE: &str = "No result message returned.";

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("Backend returned a non-JSON response: {0}")]
    InvalidResponse(String),
    #[error("Not logged in to the backend")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

#[derive(Serialize)]
struct PredictRequest {
    image: String,
}

/// Verdict returned by the backend for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PredictionResult {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default, rename = "logoName")]
    pub logo_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl PredictionResult {
    pub fn is_valid(&self) -> bool {
        self.valid == Some(true)
    }

    pub fn display_message(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MESSAGE)
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|url| !url.is_empty())
    }

    /// The logo to record on the ledger, if this verdict warrants it.
    pub fn recordable_logo(&self) -> Option<&str> {
        if !self.is_valid() {
            return None;
        }
        self.logo_name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

pub struct PredictionClient {
    http: Client,
    backend: BackendConfig,
    /// Path of the login page as served, including any `base_url` prefix.
    login_page: String,
}

impl PredictionClient {
    pub fn new(backend: &BackendConfig) -> Result<Self, PredictionError> {
        let http = Client::builder().cookie_store(true).build()?;
        let login_page = Url::parse(&backend.login_url())
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| backend.login_path.clone());
        Ok(Self {
            http,
            backend: backend.clone(),
            login_page,
        })
    }

    fn is_login_page(&self, url: &Url) -> bool {
        url.path() == self.login_page
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(), PredictionError> {
        let response = self
            .http
            .post(self.backend.login_url())
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PredictionError::Status {
                status,
                message: response.text().await.unwrap_or_default(),
            });
        }
        if self.is_login_page(response.url()) {
            return Err(PredictionError::InvalidCredentials);
        }

        tracing::info!("Logged in to backend");
        Ok(())
    }

    /// Sends one image to the prediction endpoint. No retries.
    #[instrument(skip(self, payload), fields(mime = payload.mime()))]
    pub async fn submit(&self, payload: &DataUri) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        let response = self
            .http
            .post(self.backend.predict_url())
            .json(&PredictRequest {
                image: payload.to_string(),
            })
            .send()
            .await?;

        if self.is_login_page(response.url()) {
            return Err(PredictionError::Unauthenticated);
        }

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(
            "Prediction answered {} in {} ms",
            status,
            started.elapsed().as_millis()
        );

        if !status.is_success() {
            let message = serde_json::from_str::<PredictionResult>(&body)
                .ok()
                .and_then(|result| result.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(PredictionError::Status { status, message });
        }

        serde_json::from_str(&body).map_err(|e| PredictionError::InvalidResponse(e.to_string()))
    }
}
