// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mnemonic-based key manager for AFC claim signing.
//!
//! The signing key is derived from a BIP-39 mnemonic and lives only as long
//! as the key manager instance; the executor constructs one per claim call
//! and drops it when the call returns, so key material is never held across
//! submissions.

use base64ct::{Base64, Encoding};
use bip39::{Language, Mnemonic, Seed};
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::ChannelId;

use super::AfcError;

/// Bech32-style prefix of AFC account addresses.
const ADDRESS_PREFIX: &str = "afc1";

/// A claim ready for broadcast: the sign-doc fields plus the signature and
/// the signer's public key, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedClaim {
    pub channel_id: ChannelId,
    pub sequence: u64,
    /// Package payload, base64
    pub payload: String,
    /// Signer account address
    pub signer: String,
    /// Compressed secp256k1 public key, base64
    pub pub_key: String,
    /// ECDSA signature over the canonical sign-doc, base64
    pub signature: String,
}

/// Canonical sign-doc. Field order is fixed; serde_json preserves struct
/// declaration order, which is the wire-canonical order for this deployment.
#[derive(Debug, Serialize)]
struct ClaimSignDoc<'a> {
    channel_id: ChannelId,
    sequence: u64,
    payload: &'a str,
    signer: &'a str,
}

/// Holds a derived signing key and its account address.
pub struct KeyManager {
    signing_key: SigningKey,
    address: String,
}

impl KeyManager {
    /// Derive a key manager from a BIP-39 mnemonic phrase.
    pub fn from_mnemonic(phrase: &str) -> Result<Self, AfcError> {
        let mnemonic = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| AfcError::InvalidKey(format!("invalid mnemonic: {e}")))?;
        let seed = Seed::new(&mnemonic, "");

        // The account key is the first 32 seed bytes interpreted as a scalar.
        let signing_key = SigningKey::from_slice(&seed.as_bytes()[..32])
            .map_err(|e| AfcError::InvalidKey(format!("seed is not a valid key: {e}")))?;
        let address = derive_address(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Account address of this signer.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign a claim for broadcast.
    pub fn sign_claim(
        &self,
        channel_id: ChannelId,
        sequence: u64,
        payload: &[u8],
    ) -> Result<SignedClaim, AfcError> {
        let payload_b64 = Base64::encode_string(payload);
        let sign_doc = ClaimSignDoc {
            channel_id,
            sequence,
            payload: &payload_b64,
            signer: &self.address,
        };
        let doc_bytes = serde_json::to_vec(&sign_doc)
            .map_err(|e| AfcError::InvalidPayload(format!("sign-doc encoding failed: {e}")))?;

        let signature: Signature = self.signing_key.sign(&doc_bytes);
        let pub_key = self.signing_key.verifying_key().to_sec1_bytes();

        Ok(SignedClaim {
            channel_id,
            sequence,
            payload: payload_b64,
            signer: self.address.clone(),
            pub_key: Base64::encode_string(&pub_key),
            signature: Base64::encode_string(&signature.to_bytes()[..]),
        })
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("KeyManager")
            .field("address", &self.address)
            .finish()
    }
}

/// Account address: prefix plus hex of the first 20 bytes of
/// sha256(compressed public key).
fn derive_address(verifying_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(verifying_key.to_sec1_bytes());
    let mut address = String::with_capacity(ADDRESS_PREFIX.len() + 40);
    address.push_str(ADDRESS_PREFIX);
    for byte in &digest[..20] {
        address.push_str(&format!("{byte:02x}"));
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    // Standard BIP-39 test vector phrase
    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn derives_stable_address() {
        let a = KeyManager::from_mnemonic(TEST_MNEMONIC).unwrap();
        let b = KeyManager::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with(ADDRESS_PREFIX));
        // prefix + 20 bytes hex
        assert_eq!(a.address().len(), ADDRESS_PREFIX.len() + 40);
    }

    #[test]
    fn rejects_garbage_mnemonic() {
        let result = KeyManager::from_mnemonic("definitely not a valid phrase");
        assert!(matches!(result, Err(AfcError::InvalidKey(_))));
    }

    #[test]
    fn signed_claim_is_deterministic_and_complete() {
        let km = KeyManager::from_mnemonic(TEST_MNEMONIC).unwrap();
        let claim_a = km.sign_claim(7, 42, b"package-bytes").unwrap();
        let claim_b = km.sign_claim(7, 42, b"package-bytes").unwrap();

        // RFC 6979 deterministic ECDSA: same doc, same signature
        assert_eq!(claim_a.signature, claim_b.signature);
        assert_eq!(claim_a.channel_id, 7);
        assert_eq!(claim_a.sequence, 42);
        assert_eq!(claim_a.signer, km.address());
        assert_eq!(
            Base64::decode_vec(&claim_a.payload).unwrap(),
            b"package-bytes"
        );
        assert!(!claim_a.pub_key.is_empty());
    }

    #[test]
    fn different_payloads_sign_differently() {
        let km = KeyManager::from_mnemonic(TEST_MNEMONIC).unwrap();
        let a = km.sign_claim(7, 42, b"one").unwrap();
        let b = km.sign_claim(7, 42, b"two").unwrap();
        assert_ne!(a.signature, b.signature);
    }
}
