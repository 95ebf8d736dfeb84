// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AFC executor: the client pool behind the relay engine.
//!
//! Presents one logical "submit claim / query chain" capability backed by a
//! fixed set of interchangeable endpoints. Reads go to a uniformly random
//! endpoint; signed calls additionally resolve the signing identity, bind it
//! for exactly the duration of the call under the signing gate, and drop it
//! on every exit path.

use std::future::Future;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{ChainConfig, KEY_TYPE_STORE_MNEMONIC};
use crate::models::ChannelId;
use crate::secrets::SecretStore;

use super::keys::KeyManager;
use super::rpc::{AfcRpcClient, Prophecy};
use super::AfcError;

/// Target-chain capability used by the relay engine.
///
/// This is the seam between relay logic and transport: the engine only ever
/// needs the remote cursor, the claim primitive, and diagnostics.
pub trait AfcApi: Send + Sync {
    /// Account address claims are signed with.
    fn relayer_address(&self) -> impl Future<Output = Result<String, AfcError>> + Send;

    /// The chain's next expected sequence for a channel (the remote cursor).
    fn current_sequence(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<u64, AfcError>> + Send;

    /// Submit a commit-level claim; returns the transaction hash.
    fn claim(
        &self,
        channel_id: ChannelId,
        sequence: u64,
        payload: &[u8],
    ) -> impl Future<Output = Result<String, AfcError>> + Send;

    /// On-chain validation record for a sequence (diagnostics only).
    fn prophecy(
        &self,
        channel_id: ChannelId,
        sequence: u64,
    ) -> impl Future<Output = Result<Prophecy, AfcError>> + Send;
}

/// Multi-endpoint AFC executor.
pub struct AfcExecutor {
    chain_config: ChainConfig,
    clients: Vec<AfcRpcClient>,
    secrets: Option<SecretStore>,
    /// Serializes the bind/unbind window of the signing identity: two
    /// in-flight claim calls must never hold the identity concurrently.
    signing_gate: Mutex<()>,
}

impl AfcExecutor {
    pub fn new(
        chain_config: ChainConfig,
        secrets: Option<SecretStore>,
    ) -> Result<Self, AfcError> {
        if chain_config.afc_key_type == KEY_TYPE_STORE_MNEMONIC && secrets.is_none() {
            return Err(AfcError::InvalidKey(
                "afc_key_type is store_mnemonic but no secret store is configured".to_string(),
            ));
        }

        let clients = chain_config
            .afc_rpc_addrs
            .iter()
            .map(AfcRpcClient::new)
            .collect();

        Ok(Self {
            chain_config,
            clients,
            secrets,
            signing_gate: Mutex::new(()),
        })
    }

    /// Pick an endpoint uniformly at random.
    ///
    /// Known limitation: selection is not health-aware. An endpoint that
    /// keeps erroring retains its share of the pool and degrades
    /// availability proportionally.
    fn select_client(&self) -> &AfcRpcClient {
        let idx = rand::thread_rng().gen_range(0..self.clients.len());
        &self.clients[idx]
    }

    /// Resolve the signing identity from config or the secret store.
    async fn key_manager(&self) -> Result<KeyManager, AfcError> {
        let mnemonic = if self.chain_config.afc_key_type == KEY_TYPE_STORE_MNEMONIC {
            let secrets = self.secrets.as_ref().ok_or_else(|| {
                AfcError::InvalidKey("secret store not configured".to_string())
            })?;
            secrets
                .get_secret(
                    &self.chain_config.afc_secret_name,
                    &self.chain_config.afc_secret_region,
                )
                .await?
        } else {
            self.chain_config.afc_mnemonic.clone()
        };
        KeyManager::from_mnemonic(&mnemonic)
    }
}

impl AfcApi for AfcExecutor {
    fn relayer_address(&self) -> impl Future<Output = Result<String, AfcError>> + Send {
        async move {
            let key_manager = self.key_manager().await?;
            Ok(key_manager.address().to_string())
        }
    }

    fn current_sequence(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<u64, AfcError>> + Send {
        async move {
            self.select_client()
                .get_current_oracle_sequence(channel_id)
                .await
        }
    }

    fn claim(
        &self,
        channel_id: ChannelId,
        sequence: u64,
        payload: &[u8],
    ) -> impl Future<Output = Result<String, AfcError>> + Send {
        async move {
            if payload.is_empty() {
                return Err(AfcError::InvalidPayload("empty package payload".to_string()));
            }

            let client = self.select_client();
            let key_manager = self.key_manager().await?;

            // Identity bind window: held only for the signed call itself,
            // released by guard drop on every exit path.
            let result = {
                let _bound = self.signing_gate.lock().await;
                let signed = key_manager.sign_claim(channel_id, sequence, payload)?;
                client.broadcast_claim(&signed).await
            };

            let broadcast = result?;
            if broadcast.code != 0 {
                // The network accepted the call but the application rejected it
                return Err(AfcError::ClaimRejected {
                    code: broadcast.code,
                    log: broadcast.log,
                });
            }

            info!(
                channel = channel_id,
                sequence,
                tx_hash = %broadcast.hash,
                "claim accepted"
            );
            Ok(broadcast.hash)
        }
    }

    fn prophecy(
        &self,
        channel_id: ChannelId,
        sequence: u64,
    ) -> impl Future<Output = Result<Prophecy, AfcError>> + Send {
        async move {
            self.select_client()
                .get_prophecy(channel_id, sequence)
                .await
        }
    }
}
