// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Package Observer
//!
//! Background task that extracts cross-chain package events from the source
//! chain (ASC) into the embedded redb claim store.
//!
//! ## Strategy
//!
//! 1. **Finality first**: only heights at least `asc_confirm_num` blocks below
//!    the chain head are scanned, so a shallow reorg never lands in the store.
//! 2. **One height per query**: `eth_getLogs` is issued per block, and the
//!    height's packages plus the watermark advance commit in one transaction.
//!    A crash between heights loses nothing; a crash inside a height loses the
//!    whole height and rescans it.
//!
//! ## Checkpointing
//!
//! The last fully scanned height is the channel watermark in redb. On restart
//! the observer resumes from the watermark, or from `asc_start_height` on a
//! fresh database.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, FixedBytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::alert::Alerter;
use crate::config::ChainConfig;
use crate::models::{ChannelId, Package};
use crate::store::{ClaimStore, StoreError};

/// keccak256("CrossChainPackage(uint16,uint64,bytes)")
const PACKAGE_TOPIC: FixedBytes<32> = FixedBytes::new([
    0x6a, 0xb7, 0x71, 0x69, 0xd6, 0x9c, 0x1d, 0x38, 0x64, 0x71, 0x92, 0x81, 0x9f, 0xae, 0xda, 0xf2,
    0x72, 0x08, 0x18, 0x92, 0x2f, 0x3a, 0x7e, 0x30, 0x11, 0x32, 0x17, 0xb3, 0x43, 0x49, 0x45, 0x38,
]);

/// Cross-chain package event indexer that runs as a background tokio task.
pub struct PackageObserver {
    store: Arc<ClaimStore>,
    alerter: Arc<Alerter>,
    config: ChainConfig,
    contract: Address,
    poll_interval: Duration,
}

impl PackageObserver {
    /// Create an observer over the configured source-chain providers.
    ///
    /// The contract address was validated at config load, so the parse here
    /// only fails on a hand-built config.
    pub fn new(
        store: Arc<ClaimStore>,
        alerter: Arc<Alerter>,
        config: ChainConfig,
    ) -> Result<Self, ObserverError> {
        let contract = config
            .asc_cross_chain_contract_address
            .parse::<Address>()
            .map_err(|e| ObserverError::Config(e.to_string()))?;
        let poll_interval = Duration::from_millis(config.observe_interval_ms);
        Ok(Self {
            store,
            alerter,
            config,
            contract,
            poll_interval,
        })
    }

    /// Run the observer loop until the cancellation token is triggered.
    ///
    /// This should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(observer.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            chain = self.config.asc_chain_id,
            contract = %self.contract,
            providers = self.config.asc_providers.len(),
            "Package observer starting"
        );

        let mut providers = Vec::new();
        for addr in &self.config.asc_providers {
            match addr.parse::<url::Url>() {
                Ok(url) => providers.push(ProviderBuilder::new().connect_http(url)),
                Err(e) => {
                    tracing::error!(provider = %addr, error = %e, "Invalid ASC provider URL, skipping");
                }
            }
        }
        if providers.is_empty() {
            tracing::error!("No usable ASC providers, package observer exiting");
            return;
        }

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Package observer shutting down");
                return;
            }

            let provider = &providers[rand::thread_rng().gen_range(0..providers.len())];
            let decode_latch = decode_latch_key(self.config.asc_chain_id);
            match self.observe_step(provider).await {
                Ok(()) => self.alerter.clear(&decode_latch),
                // A decode mismatch will not fix itself; the watermark stays
                // frozen until the contract and relayer agree again
                Err(e @ ObserverError::Decode(_)) => {
                    tracing::error!(error = %e, "Malformed package event, scan frozen");
                    self.alerter
                        .raise(&decode_latch, &format!("scan frozen: {e}"))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Observer step failed, will retry");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Package observer shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one observation step: scan confirmed heights above the
    /// watermark, newest last, committing each height atomically.
    async fn observe_step<P: Provider>(&self, provider: &P) -> Result<(), ObserverError> {
        let channel = self.config.asc_chain_id;
        let watermark = self.store.watermark(channel)?.map(|(height, _)| height);

        let head = provider
            .get_block_number()
            .await
            .map_err(|e| ObserverError::Rpc(e.to_string()))?;

        let Some((start, end)) = scan_range(
            watermark,
            self.config.asc_start_height,
            head,
            self.config.asc_confirm_num,
            self.config.max_blocks_per_cycle,
        ) else {
            // Caught up to the confirmed head
            return Ok(());
        };

        for height in start..=end {
            let packages = self.fetch_packages(provider, height).await?;
            if !packages.is_empty() {
                tracing::info!(
                    height,
                    packages = packages.len(),
                    "Extracted cross-chain packages"
                );
            }
            match self.store.commit_height(channel, height, &packages) {
                Ok(()) => {}
                // Another pass already covered this height; skip forward
                Err(StoreError::WatermarkRegression { current, .. }) => {
                    tracing::warn!(height, watermark = current, "Height already committed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Fetch and decode package events emitted at a single height.
    ///
    /// A log that carries the package topic but does not decode means the
    /// contract and relayer disagree on the event layout. That is fatal for
    /// the cycle: skipping it would silently drop a sequence number and wedge
    /// the channel on the target chain.
    async fn fetch_packages<P: Provider>(
        &self,
        provider: &P,
        height: u64,
    ) -> Result<Vec<Package>, ObserverError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(PACKAGE_TOPIC)
            .from_block(height)
            .to_block(height);

        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(|e| ObserverError::Rpc(e.to_string()))?;

        let mut packages = Vec::with_capacity(logs.len());
        for log in &logs {
            let (channel_id, sequence, payload) =
                decode_package_log(log.topics(), &log.data().data)?;
            packages.push(Package {
                channel_id,
                sequence,
                payload,
                source_height: height,
                extracted_at: Utc::now(),
            });
        }
        Ok(packages)
    }
}

fn decode_latch_key(chain: ChannelId) -> String {
    format!("package_decode_{chain}")
}

/// Compute the inclusive height range one observation step should scan.
///
/// Scans `(watermark, head - confirm_num]`, starting from `start_height` when
/// no watermark exists yet, capped at `max_blocks` heights per step. Returns
/// `None` when already caught up.
fn scan_range(
    watermark: Option<u64>,
    start_height: u64,
    head: u64,
    confirm_num: u64,
    max_blocks: u64,
) -> Option<(u64, u64)> {
    let confirmed_head = head.checked_sub(confirm_num)?;
    let start = match watermark {
        Some(w) => w.checked_add(1)?,
        None => start_height,
    };
    if start > confirmed_head || max_blocks == 0 {
        return None;
    }
    let end = confirmed_head.min(start.saturating_add(max_blocks - 1));
    Some((start, end))
}

/// Decode a cross-chain package event.
///
/// Layout: `topics[0]` is the event signature, `topics[1]` the channel id in
/// its last 2 bytes, `topics[2]` the sequence in its last 8 bytes, and the
/// log data is the raw payload.
fn decode_package_log(
    topics: &[B256],
    data: &[u8],
) -> Result<(ChannelId, u64, Vec<u8>), ObserverError> {
    if topics.len() < 3 {
        return Err(ObserverError::Decode(format!(
            "package event has {} topics, expected 3",
            topics.len()
        )));
    }
    if topics[1][..30].iter().any(|b| *b != 0) {
        return Err(ObserverError::Decode(
            "channel topic exceeds u16 range".to_string(),
        ));
    }
    let channel_id = u16::from_be_bytes([topics[1][30], topics[1][31]]);
    if topics[2][..24].iter().any(|b| *b != 0) {
        return Err(ObserverError::Decode(
            "sequence topic exceeds u64 range".to_string(),
        ));
    }
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&topics[2][24..]);
    let sequence = u64::from_be_bytes(seq_bytes);
    Ok((channel_id, sequence, data.to_vec()))
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("malformed package event: {0}")]
    Decode(String),

    #[error("observer config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
