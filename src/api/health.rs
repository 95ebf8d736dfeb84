// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Claim store reachability ("ok" or "unavailable").
    pub store: String,
}

/// Health check endpoint handler.
///
/// Returns 200 if the claim store answers a read, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let chain = state.config.chain_config.asc_chain_id;
    let store = match state.store.watermark(chain) {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check store read failed");
            "unavailable"
        }
    };

    let all_ok = store == "ok";
    let response = HealthResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        store: store.to_string(),
    };

    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
