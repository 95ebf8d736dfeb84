// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret store client.
//!
//! Resolves named secrets (the signing mnemonic, or the whole config
//! document) from an external HTTP secret store. Failures propagate to the
//! caller as setup errors; the client never retries internally, since the
//! relay engine's own retry cycle owns that policy.

use serde::Deserialize;
use std::time::Duration;

/// Environment variable holding the secret store base URL.
pub const SECRET_STORE_URL_ENV: &str = "SECRET_STORE_URL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret store base URL is not configured ({SECRET_STORE_URL_ENV})")]
    MissingBaseUrl,

    #[error("secret store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("secret store returned status {0} for {1}")]
    Status(reqwest::StatusCode, String),
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    value: String,
}

/// Secret store HTTP client.
#[derive(Clone)]
pub struct SecretStore {
    base_url: String,
    client: reqwest::Client,
}

impl SecretStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Build a client from `SECRET_STORE_URL`.
    pub fn from_env() -> Result<Self, SecretError> {
        let base_url =
            std::env::var(SECRET_STORE_URL_ENV).map_err(|_| SecretError::MissingBaseUrl)?;
        Ok(Self::new(base_url))
    }

    /// Fetch the plaintext value of `name` in `region`.
    pub async fn get_secret(&self, name: &str, region: &str) -> Result<String, SecretError> {
        let url = format!(
            "{}/secret/{region}/{name}",
            self.base_url.trim_end_matches('/')
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SecretError::Status(response.status(), name.to_string()));
        }

        let body: SecretResponse = response.json().await?;
        Ok(body.value)
    }
}
