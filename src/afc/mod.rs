// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AFC target-chain integration.
//!
//! - [`keys`] - mnemonic-based signing key manager
//! - [`rpc`] - single-endpoint JSON client
//! - [`executor`] - the client pool behind the relay engine

pub mod executor;
pub mod keys;
pub mod rpc;

pub use executor::{AfcApi, AfcExecutor};
pub use keys::KeyManager;
pub use rpc::{AfcRpcClient, BroadcastResult, Prophecy};

use crate::secrets::SecretError;

/// Errors from target-chain operations.
#[derive(Debug, thiserror::Error)]
pub enum AfcError {
    #[error("afc rpc error: {0}")]
    Rpc(String),

    #[error("claim rejected by afc, code={code}, log={log}")]
    ClaimRejected { code: u32, log: String },

    #[error("invalid claim payload: {0}")]
    InvalidPayload(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("signing key setup failed: {0}")]
    Secret(#[from] SecretError),
}

impl AfcError {
    /// Whether the relay engine may retry this claim on a later cycle.
    ///
    /// Network faults, secret-store outages and application-level rejections
    /// are transient; a payload or key the chain can never accept is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AfcError::Rpc(_) | AfcError::ClaimRejected { .. } | AfcError::Secret(_) => true,
            AfcError::InvalidPayload(_) | AfcError::InvalidKey(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(AfcError::Rpc("timeout".into()).is_retryable());
        assert!(AfcError::ClaimRejected { code: 5, log: "seq mismatch".into() }.is_retryable());
        assert!(!AfcError::InvalidPayload("empty".into()).is_retryable());
        assert!(!AfcError::InvalidKey("bad mnemonic".into()).is_retryable());
    }

    #[test]
    fn rejection_error_carries_code_and_log() {
        let err = AfcError::ClaimRejected { code: 7, log: "insufficient fee".into() };
        let text = err.to_string();
        assert!(text.contains("code=7"));
        assert!(text.contains("insufficient fee"));
    }
}
