// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Engine
//!
//! Background task that drives durable claim records to the target chain
//! (AFC), one channel at a time, in strict sequence order.
//!
//! Each cycle reconciles against the chain's own oracle cursor before doing
//! anything else, so a restart, a lost acknowledgement, or a claim landed by
//! another path never causes a double submission. The chain is the source of
//! truth for what has been processed; the store is the source of truth for
//! what exists.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::afc::AfcApi;
use crate::alert::Alerter;
use crate::config::{AlertConfig, ChainConfig};
use crate::models::{ChannelId, ClaimStatus};
use crate::store::{ClaimStore, StoreError};

/// Sequenced claim submitter that runs as a background tokio task.
pub struct RelayEngine<E: AfcApi> {
    store: Arc<ClaimStore>,
    executor: Arc<E>,
    alerter: Arc<Alerter>,
    chain_config: ChainConfig,
    alert_config: AlertConfig,
    poll_interval: Duration,
    backoff_base: chrono::Duration,
    backoff_max: chrono::Duration,
}

impl<E: AfcApi> RelayEngine<E> {
    pub fn new(
        store: Arc<ClaimStore>,
        executor: Arc<E>,
        alerter: Arc<Alerter>,
        chain_config: ChainConfig,
        alert_config: AlertConfig,
    ) -> Self {
        let poll_interval = Duration::from_millis(chain_config.relay_interval_ms);
        let backoff_base = chrono::Duration::milliseconds(chain_config.claim_backoff_base_ms as i64);
        let backoff_max = chrono::Duration::milliseconds(chain_config.claim_backoff_max_ms as i64);
        Self {
            store,
            executor,
            alerter,
            chain_config,
            alert_config,
            poll_interval,
            backoff_base,
            backoff_max,
        }
    }

    /// Run the relay loop until the cancellation token is triggered.
    ///
    /// This should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(engine.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            channels = ?self.chain_config.channels,
            "Relay engine starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Relay engine shutting down");
                return;
            }

            self.relay_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Relay engine shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one relay cycle across all configured channels.
    ///
    /// A failing channel never blocks the others; its error is logged and the
    /// cycle moves on.
    pub async fn relay_step(&self) {
        self.check_chain_liveness().await;

        for &channel in &self.chain_config.channels {
            if let Err(e) = self.process_channel(channel).await {
                tracing::warn!(channel, error = %e, "Relay cycle failed for channel");
            }
            self.check_package_delay(channel).await;
        }
    }

    /// Advance one channel by at most one claim submission.
    pub async fn process_channel(&self, channel: ChannelId) -> Result<(), RelayError> {
        let cursor = self
            .executor
            .current_sequence(channel)
            .await
            .map_err(|e| RelayError::Afc(e.to_string()))?;

        // Reconcile first: anything below the chain's cursor is already
        // processed on chain, whether or not we saw the acknowledgement.
        let confirmed = self.store.confirm_below(channel, cursor)?;
        if confirmed > 0 {
            tracing::info!(channel, cursor, confirmed, "Reconciled claims against remote cursor");
        }

        let Some(record) = self.store.next_claimable(channel, cursor)? else {
            // Head of line is gone (or confirmed); any wedge is resolved
            self.alerter.clear(&failed_latch_key(channel));
            return Ok(());
        };

        // Ordering gate: the chain expects exactly `cursor` next. A higher
        // sequence means the observer has not extracted the expected package
        // yet; submitting it out of order would be rejected anyway.
        if record.sequence > cursor {
            tracing::debug!(
                channel,
                cursor,
                next_stored = record.sequence,
                "Waiting for expected sequence to be extracted"
            );
            return Ok(());
        }

        if record.status == ClaimStatus::Failed {
            let key = failed_latch_key(channel);
            let text = format!(
                "channel {channel} is wedged: claim for sequence {} failed permanently: {}",
                record.sequence,
                record.last_error.as_deref().unwrap_or("unknown error"),
            );
            if self.alerter.raise(&key, &text).await {
                tracing::error!(channel, sequence = record.sequence, "Channel wedged on failed claim");
            }
            return Ok(());
        }
        self.alerter.clear(&failed_latch_key(channel));

        if !record.attempt_due(Utc::now()) {
            return Ok(());
        }

        match self
            .executor
            .claim(channel, record.sequence, &record.payload)
            .await
        {
            Ok(tx_hash) => {
                tracing::info!(channel, sequence = record.sequence, tx_hash = %tx_hash, "Claim submitted");
                self.store.update_claim(channel, record.sequence, |r| {
                    r.mark_submitted(tx_hash);
                })?;
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(channel, sequence = record.sequence, error = %e, "Claim attempt failed, backing off");
                let (base, max) = (self.backoff_base, self.backoff_max);
                self.store.update_claim(channel, record.sequence, |r| {
                    r.record_attempt(e.to_string(), base, max);
                })?;
            }
            Err(e) => {
                tracing::error!(channel, sequence = record.sequence, error = %e, "Claim failed permanently");
                self.store.update_claim(channel, record.sequence, |r| {
                    r.mark_failed(e.to_string());
                })?;
                let text = format!(
                    "claim for channel {channel} sequence {} failed permanently: {e}",
                    record.sequence
                );
                self.alerter.raise(&failed_latch_key(channel), &text).await;
            }
        }

        Ok(())
    }

    /// Alert when the source-chain watermark has stopped advancing.
    ///
    /// The watermark timestamp is written by the observer on every committed
    /// height, so staleness is visible here without the two loops sharing
    /// anything beyond the store.
    async fn check_chain_liveness(&self) {
        let chain = self.chain_config.asc_chain_id;
        let watermark = match self.store.watermark(chain) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read watermark for liveness check");
                return;
            }
        };
        let Some((height, updated_at)) = watermark else {
            // Nothing scanned yet; stagnation is meaningless before first commit
            return;
        };

        let age = Utc::now().signed_duration_since(updated_at);
        let timeout = chrono::Duration::seconds(self.alert_config.block_update_timeout_secs as i64);
        let key = stale_block_latch_key(chain);
        if age > timeout {
            let text = format!(
                "source chain {chain} watermark stuck at height {height} for {}s",
                age.num_seconds()
            );
            self.alerter.raise(&key, &text).await;
        } else {
            self.alerter.clear(&key);
        }
    }

    /// Alert when a channel's oldest Pending claim has waited too long.
    async fn check_package_delay(&self, channel: ChannelId) {
        let oldest = match self.store.oldest_pending(channel) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(channel, error = %e, "Failed to read oldest pending claim");
                return;
            }
        };
        let key = package_delay_latch_key(channel);
        let Some(record) = oldest else {
            self.alerter.clear(&key);
            return;
        };

        let age = Utc::now().signed_duration_since(record.extracted_at);
        let threshold =
            chrono::Duration::seconds(self.alert_config.package_delay_alert_threshold_secs as i64);
        if age > threshold {
            let text = format!(
                "channel {channel} package sequence {} pending for {}s",
                record.sequence,
                age.num_seconds()
            );
            self.alerter.raise(&key, &text).await;
        } else {
            self.alerter.clear(&key);
        }
    }
}

fn failed_latch_key(channel: ChannelId) -> String {
    format!("claim_failed_{channel}")
}

fn package_delay_latch_key(channel: ChannelId) -> String {
    format!("package_delay_{channel}")
}

fn stale_block_latch_key(chain: ChannelId) -> String {
    format!("stale_block_{chain}")
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("AFC error: {0}")]
    Afc(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
