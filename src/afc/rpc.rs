// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-endpoint AFC RPC client.
//!
//! Speaks the node's JSON envelope protocol: every call POSTs
//! `{"method": ..., "params": ...}` to the endpoint root and reads either a
//! `result` or an `error` member back. Claim broadcasts are commit-level:
//! the node answers only once the transaction is included in a block, and the
//! response carries the application code for that execution.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::ChannelId;

use super::keys::SignedClaim;
use super::AfcError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Commit-level broadcast result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResult {
    /// Application response code; zero means accepted
    pub code: u32,
    /// Application log line, populated on non-zero codes
    #[serde(default)]
    pub log: String,
    /// Transaction hash
    pub hash: String,
}

/// On-chain validation record of a claimed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prophecy {
    pub channel_id: ChannelId,
    pub sequence: u64,
    /// Aggregate outcome: "pending", "success" or "failed"
    pub status: String,
    /// Validators that voted for the winning claim
    #[serde(default)]
    pub claim_validators: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SequenceResult {
    sequence: u64,
}

/// Client for one AFC endpoint.
#[derive(Debug, Clone)]
pub struct AfcRpcClient {
    endpoint: String,
    client: reqwest::Client,
}

impl AfcRpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, AfcError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| AfcError::Rpc(format!("{method}: {e}")))?;

        if !response.status().is_success() {
            return Err(AfcError::Rpc(format!(
                "{method}: http status {}",
                response.status()
            )));
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| AfcError::Rpc(format!("{method}: malformed response: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(AfcError::Rpc(format!("{method}: {error}")));
        }
        envelope
            .result
            .ok_or_else(|| AfcError::Rpc(format!("{method}: response missing result")))
    }

    /// The target chain's next expected sequence for a channel. Read-only.
    pub async fn get_current_oracle_sequence(
        &self,
        channel_id: ChannelId,
    ) -> Result<u64, AfcError> {
        let result: SequenceResult = self
            .call(
                "get_current_oracle_sequence",
                json!({ "channel_id": channel_id }),
            )
            .await?;
        Ok(result.sequence)
    }

    /// On-chain validation record for a claimed sequence. Read-only.
    pub async fn get_prophecy(
        &self,
        channel_id: ChannelId,
        sequence: u64,
    ) -> Result<Prophecy, AfcError> {
        self.call(
            "get_prophecy",
            json!({ "channel_id": channel_id, "sequence": sequence }),
        )
        .await
    }

    /// Broadcast a signed claim at commit level.
    ///
    /// A transport or protocol failure is an [`AfcError::Rpc`]; a non-zero
    /// application code is returned as a successful `BroadcastResult` for the
    /// caller to classify.
    pub async fn broadcast_claim(&self, claim: &SignedClaim) -> Result<BroadcastResult, AfcError> {
        self.call(
            "broadcast_claim",
            json!({ "tx": claim, "mode": "commit" }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afc::keys::KeyManager;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn envelope_missing_members_deserialize_to_none() {
        // Endpoints omit `result` on error and `error` on success; both
        // members must stay optional without requiring T: Default.
        let envelope: RpcEnvelope<SequenceResult> = serde_json::from_str("{}").unwrap();
        assert!(envelope.result.is_none());
        assert!(envelope.error.is_none());
    }

    #[tokio::test]
    async fn reads_current_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({ "method": "get_current_oracle_sequence" }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "sequence": 42 }
            })))
            .mount(&server)
            .await;

        let client = AfcRpcClient::new(server.uri());
        assert_eq!(client.get_current_oracle_sequence(7).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn broadcast_returns_application_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({ "method": "broadcast_claim", "params": { "mode": "commit" } }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "code": 4, "log": "sequence mismatch", "hash": "A1B2" }
            })))
            .mount(&server)
            .await;

        let km = KeyManager::from_mnemonic(TEST_MNEMONIC).unwrap();
        let claim = km.sign_claim(7, 42, b"payload").unwrap();

        let client = AfcRpcClient::new(server.uri());
        let result = client.broadcast_claim(&claim).await.unwrap();
        assert_eq!(result.code, 4);
        assert_eq!(result.log, "sequence mismatch");
    }

    #[tokio::test]
    async fn rpc_error_member_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "unknown channel"
            })))
            .mount(&server)
            .await;

        let client = AfcRpcClient::new(server.uri());
        let result = client.get_current_oracle_sequence(99).await;
        assert!(matches!(result, Err(AfcError::Rpc(msg)) if msg.contains("unknown channel")));
    }

    #[tokio::test]
    async fn http_failure_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = AfcRpcClient::new(server.uri());
        assert!(client.get_current_oracle_sequence(1).await.is_err());
    }
}
