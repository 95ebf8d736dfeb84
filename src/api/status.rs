// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::ChannelId;
use crate::state::AppState;

/// Service identity returned from the root path.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    /// Deployment moniker from the alert configuration.
    pub moniker: String,
    pub started_at: DateTime<Utc>,
}

/// Observer watermark for the source chain.
#[derive(Debug, Serialize, ToSchema)]
pub struct WatermarkInfo {
    /// Last fully scanned source-chain height.
    pub height: u64,
    /// When the watermark last advanced.
    pub updated_at: DateTime<Utc>,
}

/// Relay progress for one channel, reported from the durable store.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelStatus {
    pub channel_id: ChannelId,
    pub pending: usize,
    pub submitted: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Sequence of the oldest claim still waiting to be submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending_sequence: Option<u64>,
    /// How long the oldest pending claim has been waiting, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending_age_secs: Option<i64>,
}

/// Full relay status across all configured channels.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Source chain id the observer scans.
    pub asc_chain_id: ChannelId,
    /// Address claims are signed with, when resolved at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relayer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<WatermarkInfo>,
    pub channels: Vec<ChannelStatus>,
}

/// Root endpoint handler.
#[utoipa::path(
    get,
    path = "/",
    tag = "Status",
    responses(
        (status = 200, description = "Service identity", body = ServiceInfo)
    )
)]
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        moniker: state.config.alert_config.moniker.clone(),
        started_at: state.started_at,
    })
}

/// Relay status endpoint handler.
///
/// Everything here is read from the claim store, so the numbers are exactly
/// what would survive a restart.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Status",
    responses(
        (status = 200, description = "Per-channel relay progress", body = StatusResponse),
        (status = 500, description = "Store read failed")
    )
)]
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let chain = state.config.chain_config.asc_chain_id;
    let watermark = state
        .store
        .watermark(chain)?
        .map(|(height, updated_at)| WatermarkInfo { height, updated_at });

    let now = Utc::now();
    let mut channels = Vec::with_capacity(state.config.chain_config.channels.len());
    for &channel_id in &state.config.chain_config.channels {
        let [pending, submitted, confirmed, failed] = state.store.status_counts(channel_id)?;
        let oldest = state.store.oldest_pending(channel_id)?;
        channels.push(ChannelStatus {
            channel_id,
            pending,
            submitted,
            confirmed,
            failed,
            oldest_pending_sequence: oldest.as_ref().map(|r| r.sequence),
            oldest_pending_age_secs: oldest
                .as_ref()
                .map(|r| now.signed_duration_since(r.extracted_at).num_seconds()),
        });
    }

    Ok(Json(StatusResponse {
        asc_chain_id: chain,
        relayer_address: state.relayer_address.clone(),
        watermark,
        channels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Package;
    use crate::store::ClaimStore;
    use std::sync::Arc;

    fn test_state(dir: &std::path::Path) -> AppState {
        let store = Arc::new(ClaimStore::open(dir.join("claims.redb")).unwrap());
        let config = Config::from_json(
            r#"{
                "db_config": { "path": "/tmp/claims.redb" },
                "chain_config": {
                    "asc_start_height": 1,
                    "asc_providers": ["http://asc:8545"],
                    "asc_confirm_num": 15,
                    "asc_chain_id": 2,
                    "asc_cross_chain_contract_address": "0x0000000000000000000000000000000000001004",
                    "channels": [7],
                    "afc_rpc_addrs": ["http://afc:1317"],
                    "afc_key_type": "mnemonic",
                    "afc_mnemonic": "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
                    "relay_interval_ms": 1000,
                    "observe_interval_ms": 1000
                },
                "alert_config": {
                    "moniker": "test",
                    "block_update_timeout_secs": 600,
                    "package_delay_alert_threshold_secs": 600
                }
            }"#,
        )
        .unwrap();
        AppState::new(store, Arc::new(config), Some("afc1relayer".to_string()))
    }

    #[tokio::test]
    async fn status_reports_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let package = Package {
            channel_id: 7,
            sequence: 3,
            payload: vec![1],
            source_height: 50,
            extracted_at: Utc::now(),
        };
        state.store.commit_height(2, 50, &[package]).unwrap();

        let Json(response) = status(State(state)).await.unwrap();
        assert_eq!(response.asc_chain_id, 2);
        assert_eq!(response.watermark.unwrap().height, 50);
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels[0].pending, 1);
        assert_eq!(response.channels[0].oldest_pending_sequence, Some(3));
    }

    #[tokio::test]
    async fn root_reports_identity() {
        let dir = tempfile::tempdir().unwrap();
        let Json(info) = root(State(test_state(dir.path()))).await;
        assert_eq!(info.name, env!("CARGO_PKG_NAME"));
        assert_eq!(info.moniker, "test");
    }
}
