// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain records for the relay pipeline.
//!
//! A [`Package`] is extracted from a finalized ASC block by the observer and
//! persisted as a Pending [`ClaimRecord`]. From that point on the record is
//! owned by the relay engine, which drives it through the status machine:
//!
//! ```text
//! Pending ──claim accepted──► Submitted ──remote cursor passes──► Confirmed
//!    │
//!    └──non-retryable error──► Failed (terminal, kept as audit trail)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Logical cross-chain route identifier. Each channel has its own strictly
/// increasing sequence space assigned by the source chain.
pub type ChannelId = u16;

/// A cross-chain package extracted from a source-chain block.
///
/// Immutable once persisted; the extract-then-persist ordering guarantees a
/// package is durably stored before it is ever offered for claiming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Channel the package belongs to
    pub channel_id: ChannelId,
    /// Per-channel sequence number assigned by the source chain, never reused
    pub sequence: u64,
    /// Opaque cross-chain payload bytes
    pub payload: Vec<u8>,
    /// Source-chain block height the package was emitted at
    pub source_height: u64,
    /// When the observer extracted the package
    pub extracted_at: DateTime<Utc>,
}

/// Claim record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    /// Extracted and waiting to be submitted (or retried)
    Pending,
    /// Claim transaction accepted by the target network
    Submitted,
    /// Remote oracle cursor has passed this sequence
    Confirmed,
    /// Non-retryable failure; requires operator intervention
    Failed,
}

impl Default for ClaimStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Per-channel-and-sequence claim state machine entry.
///
/// Created by the observer (always Pending); transitioned exclusively by the
/// relay engine. Never deleted, including Failed records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Channel the claim belongs to
    pub channel_id: ChannelId,
    /// Per-channel sequence of the underlying package
    pub sequence: u64,
    /// Package payload to submit with the claim
    pub payload: Vec<u8>,
    /// Source-chain height the package came from
    pub source_height: u64,
    /// Current status
    pub status: ClaimStatus,
    /// Target-chain transaction hash (once submitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Consecutive failed submission attempts since the last success
    pub attempt_count: u32,
    /// When the last submission attempt was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt is allowed (exponential backoff)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last submission error, for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the package was extracted from the source chain
    pub extracted_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl ClaimRecord {
    /// Create a Pending record from an extracted package.
    pub fn from_package(package: &Package) -> Self {
        Self {
            channel_id: package.channel_id,
            sequence: package.sequence,
            payload: package.payload.clone(),
            source_height: package.source_height,
            status: ClaimStatus::Pending,
            tx_hash: None,
            attempt_count: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
            extracted_at: package.extracted_at,
            updated_at: package.extracted_at,
        }
    }

    /// Mark the claim as accepted by the target network.
    pub fn mark_submitted(&mut self, tx_hash: String) {
        self.status = ClaimStatus::Submitted;
        self.tx_hash = Some(tx_hash);
        self.attempt_count = 0;
        self.next_attempt_at = None;
        self.last_error = None;
        self.touch();
    }

    /// Mark the claim as confirmed (remote cursor passed this sequence).
    pub fn mark_confirmed(&mut self) {
        self.status = ClaimStatus::Confirmed;
        self.next_attempt_at = None;
        self.touch();
    }

    /// Mark the claim as terminally failed.
    pub fn mark_failed(&mut self, error: String) {
        self.status = ClaimStatus::Failed;
        self.last_error = Some(error);
        self.next_attempt_at = None;
        self.touch();
    }

    /// Record a retryable submission failure.
    ///
    /// Increments the attempt counter and schedules the next attempt with
    /// exponential backoff: `base * 2^(attempts-1)`, capped at `max`.
    pub fn record_attempt(
        &mut self,
        error: String,
        backoff_base: chrono::Duration,
        backoff_max: chrono::Duration,
    ) {
        let now = Utc::now();
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_attempt_at = Some(now);
        self.last_error = Some(error);
        self.next_attempt_at =
            Some(now + claim_backoff(self.attempt_count, backoff_base, backoff_max));
        self.updated_at = now;
    }

    /// Whether the backoff window allows a submission attempt at `now`.
    pub fn attempt_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_attempt_at {
            Some(next) => now >= next,
            None => true,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Backoff delay before the next attempt, given `attempts` failures so far.
pub fn claim_backoff(
    attempts: u32,
    base: chrono::Duration,
    max: chrono::Duration,
) -> chrono::Duration {
    let base_ms = base.num_milliseconds().max(1);
    let max_ms = max.num_milliseconds().max(base_ms);
    let shift = attempts.saturating_sub(1).min(31);
    let delay_ms = base_ms.saturating_mul(1i64 << shift);
    chrono::Duration::milliseconds(delay_ms.min(max_ms))
}
