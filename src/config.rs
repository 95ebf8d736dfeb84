// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relayer configuration document.
//!
//! Configuration is a JSON document loaded at startup, either from a local
//! file or fetched whole from the secret store. Validation is fatal: the
//! process must not come up with a partial or inconsistent config, since
//! watermark-based recovery depends on the configured start height and
//! confirmation depth being sane.

use std::path::Path;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::models::ChannelId;

/// Signing key material is given inline in the config document.
pub const KEY_TYPE_MNEMONIC: &str = "mnemonic";
/// Signing key material is fetched from the secret store at claim time.
pub const KEY_TYPE_STORE_MNEMONIC: &str = "store_mnemonic";

/// Blocks behind head a height must be before it is treated as final.
/// Configured values below this are floored up to it.
pub const MIN_CONFIRM_NUM: u64 = 2;

const DEFAULT_ADMIN_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_config: DbConfig,
    pub chain_config: ChainConfig,
    pub alert_config: AlertConfig,
    #[serde(default)]
    pub admin_config: AdminConfig,
    #[serde(default)]
    pub log_config: LogConfig,
}

impl Config {
    /// Load and parse from a local JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse from a JSON string (local file or secret-store payload).
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validate every section. Any error here is fatal at startup.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.db_config.validate()?;
        self.chain_config.validate()?;
        self.alert_config.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path of the redb claim-store file.
    pub path: String,
}

impl DbConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(invalid("db path should not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// First ASC height to scan when no watermark exists yet.
    pub asc_start_height: u64,
    /// ASC provider endpoints (HTTP JSON-RPC).
    pub asc_providers: Vec<String>,
    /// Confirmation depth: never scan above head - asc_confirm_num.
    pub asc_confirm_num: u64,
    /// Channel/chain id of the ASC route; keys the watermark.
    pub asc_chain_id: ChannelId,
    /// Cross-chain contract whose logs carry the packages.
    pub asc_cross_chain_contract_address: String,
    /// Channels the relay engine drives claims for.
    pub channels: Vec<ChannelId>,

    /// AFC endpoint pool, all pointed at the same logical network.
    pub afc_rpc_addrs: Vec<String>,
    /// "mnemonic" (inline) or "store_mnemonic" (secret store).
    pub afc_key_type: String,
    #[serde(default)]
    pub afc_mnemonic: String,
    #[serde(default)]
    pub afc_secret_name: String,
    #[serde(default)]
    pub afc_secret_region: String,

    /// Relay engine cycle interval, milliseconds.
    pub relay_interval_ms: u64,
    /// Observer cycle interval, milliseconds.
    pub observe_interval_ms: u64,
    /// Heights scanned per observer cycle while catching up.
    #[serde(default = "default_max_blocks_per_cycle")]
    pub max_blocks_per_cycle: u64,
    /// Claim retry backoff base, milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub claim_backoff_base_ms: u64,
    /// Claim retry backoff cap, milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub claim_backoff_max_ms: u64,
}

fn default_max_blocks_per_cycle() -> u64 {
    200
}

fn default_backoff_base_ms() -> u64 {
    5_000
}

fn default_backoff_max_ms() -> u64 {
    600_000
}

impl ChainConfig {
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.asc_providers.is_empty() {
            return Err(invalid("asc_providers should not be empty"));
        }
        if self.asc_confirm_num == 0 {
            return Err(invalid("asc_confirm_num should be larger than 0"));
        }
        // Floor shallow confirmation depths to the supported minimum
        if self.asc_confirm_num < MIN_CONFIRM_NUM {
            self.asc_confirm_num = MIN_CONFIRM_NUM;
        }

        let address = self.contract_address()?;
        if address == Address::ZERO {
            return Err(invalid(
                "asc_cross_chain_contract_address should not be the zero address",
            ));
        }

        if self.channels.is_empty() {
            return Err(invalid("channels should not be empty"));
        }
        if self.afc_rpc_addrs.is_empty() {
            return Err(invalid("afc_rpc_addrs should not be empty"));
        }

        match self.afc_key_type.as_str() {
            KEY_TYPE_MNEMONIC => {
                if self.afc_mnemonic.is_empty() {
                    return Err(invalid("afc_mnemonic should not be empty"));
                }
            }
            KEY_TYPE_STORE_MNEMONIC => {
                if self.afc_secret_name.is_empty() {
                    return Err(invalid("afc_secret_name should not be empty"));
                }
                if self.afc_secret_region.is_empty() {
                    return Err(invalid("afc_secret_region should not be empty"));
                }
            }
            other => {
                return Err(invalid(format!(
                    "afc_key_type only supports {KEY_TYPE_MNEMONIC} and {KEY_TYPE_STORE_MNEMONIC}, got {other:?}"
                )));
            }
        }

        if self.relay_interval_ms == 0 {
            return Err(invalid("relay_interval_ms should be larger than 0"));
        }
        if self.observe_interval_ms == 0 {
            return Err(invalid("observe_interval_ms should be larger than 0"));
        }
        if self.max_blocks_per_cycle == 0 {
            return Err(invalid("max_blocks_per_cycle should be larger than 0"));
        }
        if self.claim_backoff_base_ms == 0 {
            return Err(invalid("claim_backoff_base_ms should be larger than 0"));
        }
        if self.claim_backoff_max_ms < self.claim_backoff_base_ms {
            return Err(invalid(
                "claim_backoff_max_ms should not be less than claim_backoff_base_ms",
            ));
        }
        Ok(())
    }

    /// Parsed cross-chain contract address.
    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        Address::from_str(&self.asc_cross_chain_contract_address).map_err(|e| {
            invalid(format!(
                "asc_cross_chain_contract_address is not a valid address: {e}"
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Human-readable deployment name included in every alert.
    pub moniker: String,

    #[serde(default)]
    pub telegram_bot_id: String,
    #[serde(default)]
    pub telegram_chat_id: String,

    #[serde(default)]
    pub pager_duty_auth_token: String,

    /// Alert when the watermark has not advanced for this long.
    pub block_update_timeout_secs: u64,
    /// Alert when the oldest Pending claim is older than this.
    pub package_delay_alert_threshold_secs: u64,
}

impl AlertConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.moniker.is_empty() {
            return Err(invalid("moniker should not be empty"));
        }
        if self.block_update_timeout_secs == 0 {
            return Err(invalid("block_update_timeout_secs should be larger than 0"));
        }
        if self.package_delay_alert_threshold_secs == 0 {
            return Err(invalid(
                "package_delay_alert_threshold_secs should be larger than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Admin HTTP listener bind address.
    pub listen_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADMIN_LISTEN_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "pretty" or "json".
    pub format: String,
    /// tracing env-filter directive, e.g. "info,oracle_relayer=debug".
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_chain_config() -> ChainConfig {
        ChainConfig {
            asc_start_height: 1,
            asc_providers: vec!["http://asc:8545".to_string()],
            asc_confirm_num: 2,
            asc_chain_id: 1,
            asc_cross_chain_contract_address: "0x0000000000000000000000000000000000001004"
                .to_string(),
            channels: vec![1],
            afc_rpc_addrs: vec!["http://afc:26657".to_string()],
            afc_key_type: KEY_TYPE_MNEMONIC.to_string(),
            afc_mnemonic: "test mnemonic".to_string(),
            afc_secret_name: String::new(),
            afc_secret_region: String::new(),
            relay_interval_ms: 1000,
            observe_interval_ms: 1000,
            max_blocks_per_cycle: 200,
            claim_backoff_base_ms: 5_000,
            claim_backoff_max_ms: 600_000,
        }
    }

    #[test]
    fn valid_chain_config_passes() {
        assert!(valid_chain_config().validate().is_ok());
    }

    #[test]
    fn chain_config_rejections() {
        // (mutator, expected fragment)
        let cases: Vec<(fn(&mut ChainConfig), &str)> = vec![
            (|c| c.asc_providers.clear(), "asc_providers"),
            (|c| c.asc_confirm_num = 0, "asc_confirm_num"),
            (
                |c| c.asc_cross_chain_contract_address = "not-an-address".into(),
                "asc_cross_chain_contract_address",
            ),
            (
                |c| {
                    c.asc_cross_chain_contract_address =
                        "0x0000000000000000000000000000000000000000".into()
                },
                "zero address",
            ),
            (|c| c.channels.clear(), "channels"),
            (|c| c.afc_rpc_addrs.clear(), "afc_rpc_addrs"),
            (|c| c.afc_key_type = "wrong".into(), "afc_key_type"),
            (|c| c.afc_mnemonic.clear(), "afc_mnemonic"),
            (|c| c.relay_interval_ms = 0, "relay_interval_ms"),
            (|c| c.observe_interval_ms = 0, "observe_interval_ms"),
            (|c| c.claim_backoff_base_ms = 0, "claim_backoff_base_ms"),
            (|c| c.claim_backoff_max_ms = 1, "claim_backoff_max_ms"),
        ];

        for (mutate, fragment) in cases {
            let mut config = valid_chain_config();
            mutate(&mut config);
            let err = config.validate().unwrap_err().to_string();
            assert!(
                err.contains(fragment),
                "expected error mentioning {fragment:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn store_mnemonic_requires_name_and_region() {
        let mut config = valid_chain_config();
        config.afc_key_type = KEY_TYPE_STORE_MNEMONIC.to_string();
        config.afc_mnemonic.clear();
        assert!(config.validate().is_err());

        config.afc_secret_name = "relayer-mnemonic".to_string();
        assert!(config.validate().is_err());

        config.afc_secret_region = "eu-west-1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shallow_confirm_num_is_floored() {
        let mut config = valid_chain_config();
        config.asc_confirm_num = 1;
        config.validate().unwrap();
        assert_eq!(config.asc_confirm_num, MIN_CONFIRM_NUM);
    }

    #[test]
    fn alert_config_rejections() {
        let valid = AlertConfig {
            moniker: "test".to_string(),
            telegram_bot_id: String::new(),
            telegram_chat_id: String::new(),
            pager_duty_auth_token: String::new(),
            block_update_timeout_secs: 60,
            package_delay_alert_threshold_secs: 60,
        };
        assert!(valid.validate().is_ok());

        let mut no_moniker = valid.clone();
        no_moniker.moniker.clear();
        assert!(no_moniker.validate().is_err());

        let mut no_timeout = valid.clone();
        no_timeout.block_update_timeout_secs = 0;
        assert!(no_timeout.validate().is_err());

        let mut no_threshold = valid;
        no_threshold.package_delay_alert_threshold_secs = 0;
        assert!(no_threshold.validate().is_err());
    }

    #[test]
    fn db_config_requires_path() {
        assert!(DbConfig { path: String::new() }.validate().is_err());
        assert!(DbConfig { path: "relayer.redb".into() }.validate().is_ok());
    }

    #[test]
    fn full_document_parses_with_defaults() {
        let raw = r#"{
            "db_config": { "path": "relayer.redb" },
            "chain_config": {
                "asc_start_height": 1,
                "asc_providers": ["http://asc:8545"],
                "asc_confirm_num": 2,
                "asc_chain_id": 1,
                "asc_cross_chain_contract_address": "0x0000000000000000000000000000000000001004",
                "channels": [1],
                "afc_rpc_addrs": ["http://afc:26657"],
                "afc_key_type": "mnemonic",
                "afc_mnemonic": "test mnemonic",
                "relay_interval_ms": 1000,
                "observe_interval_ms": 1000
            },
            "alert_config": {
                "moniker": "staging",
                "block_update_timeout_secs": 60,
                "package_delay_alert_threshold_secs": 60
            }
        }"#;

        let mut config = Config::from_json(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.admin_config.listen_addr, DEFAULT_ADMIN_LISTEN_ADDR);
        assert_eq!(config.log_config.format, "pretty");
        assert_eq!(config.chain_config.max_blocks_per_cycle, 200);
        assert_eq!(config.chain_config.claim_backoff_base_ms, 5_000);
    }
}
