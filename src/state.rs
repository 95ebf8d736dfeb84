// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::store::ClaimStore;

/// Shared state for the admin HTTP listener.
///
/// The admin surface is read-only: it reports from the durable claim store
/// and the loaded configuration, never from the relay loops directly.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ClaimStore>,
    pub config: Arc<Config>,
    /// Claim-signing address, resolved once at startup. None when the key
    /// material could not be fetched yet (store-held mnemonic).
    pub relayer_address: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<ClaimStore>, config: Arc<Config>, relayer_address: Option<String>) -> Self {
        Self {
            store,
            config,
            relayer_address,
            started_at: Utc::now(),
        }
    }
}
