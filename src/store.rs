// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable claim store backed by redb (pure Rust, ACID).
//!
//! The store is the only shared mutable state between the observer and the
//! relay engine; the two loops never call each other. Every compound update
//! ("append packages + advance watermark", "read record + update status")
//! runs inside a single redb write transaction so a crash can never leave a
//! partially applied height or status change behind.
//!
//! ## Table Layout
//!
//! - `watermarks`: "channel_{id}" → height u64 BE ++ updated_at i64 BE
//! - `claims`: composite key (channel u16 BE | sequence u64 BE) → ClaimRecord JSON

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::models::{ChannelId, ClaimRecord, ClaimStatus, Package};

// =============================================================================
// Table Definitions
// =============================================================================

/// Per-channel confirmed watermark: "channel_{id}" → 16 value bytes.
const WATERMARKS: TableDefinition<&str, &[u8]> = TableDefinition::new("watermarks");

/// Claim records: composite big-endian key → serialized ClaimRecord (JSON bytes).
/// Big-endian keys make forward range scans ascend by sequence within a channel.
const CLAIMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("claims");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("claim not found: channel={0} sequence={1}")]
    ClaimNotFound(ChannelId, u64),

    #[error("watermark regression on channel {channel}: {attempted} <= {current}")]
    WatermarkRegression {
        channel: ChannelId,
        current: u64,
        attempted: u64,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Key Helpers
// =============================================================================

fn watermark_key(channel: ChannelId) -> String {
    format!("channel_{channel}")
}

/// Composite claim key: channel u16 BE | sequence u64 BE.
fn claim_key(channel: ChannelId, sequence: u64) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[..2].copy_from_slice(&channel.to_be_bytes());
    key[2..].copy_from_slice(&sequence.to_be_bytes());
    key
}

/// Encode a watermark value: height ++ updated_at unix seconds.
fn encode_watermark(height: u64, updated_at: DateTime<Utc>) -> [u8; 16] {
    let mut value = [0u8; 16];
    value[..8].copy_from_slice(&height.to_be_bytes());
    value[8..].copy_from_slice(&updated_at.timestamp().to_be_bytes());
    value
}

fn decode_watermark(bytes: &[u8]) -> Option<(u64, DateTime<Utc>)> {
    if bytes.len() < 16 {
        return None;
    }
    let height = u64::from_be_bytes(bytes[..8].try_into().ok()?);
    let unix = i64::from_be_bytes(bytes[8..16].try_into().ok()?);
    let updated_at = Utc.timestamp_opt(unix, 0).single()?;
    Some((height, updated_at))
}

// =============================================================================
// ClaimStore
// =============================================================================

/// Embedded ACID store for watermarks and claim records.
pub struct ClaimStore {
    db: Database,
}

impl ClaimStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WATERMARKS)?;
            let _ = write_txn.open_table(CLAIMS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Watermarks
    // =========================================================================

    /// Current confirmed watermark for a channel, with its last-advance time.
    pub fn watermark(&self, channel: ChannelId) -> StoreResult<Option<(u64, DateTime<Utc>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WATERMARKS)?;
        let key = watermark_key(channel);
        match table.get(key.as_str())? {
            Some(v) => Ok(decode_watermark(v.value())),
            None => Ok(None),
        }
    }

    /// Durably record one fully scanned height: insert a Pending claim record
    /// for every extracted package AND advance the channel watermark, as a
    /// single transaction. Either everything for the height lands or nothing.
    ///
    /// The watermark must strictly increase; a replayed or reordered height is
    /// rejected with [`StoreError::WatermarkRegression`] and nothing is written.
    pub fn commit_height(
        &self,
        channel: ChannelId,
        height: u64,
        packages: &[Package],
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut watermarks = write_txn.open_table(WATERMARKS)?;
            let key = watermark_key(channel);

            let current = match watermarks.get(key.as_str())? {
                Some(v) => decode_watermark(v.value()).map(|(h, _)| h),
                None => None,
            };
            if let Some(current) = current {
                if height <= current {
                    return Err(StoreError::WatermarkRegression {
                        channel,
                        current,
                        attempted: height,
                    });
                }
            }

            let value = encode_watermark(height, Utc::now());
            watermarks.insert(key.as_str(), value.as_slice())?;

            let mut claims = write_txn.open_table(CLAIMS)?;
            for package in packages {
                let record = ClaimRecord::from_package(package);
                let json = serde_json::to_vec(&record)?;
                let key = claim_key(package.channel_id, package.sequence);
                claims.insert(key.as_slice(), json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Claim Records
    // =========================================================================

    /// Look up a single claim record.
    pub fn claim(&self, channel: ChannelId, sequence: u64) -> StoreResult<Option<ClaimRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLAIMS)?;
        let key = claim_key(channel, sequence);
        match table.get(key.as_slice())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// First Pending or Failed record on `channel` with `sequence >= from`,
    /// scanning in ascending sequence order.
    pub fn next_claimable(
        &self,
        channel: ChannelId,
        from: u64,
    ) -> StoreResult<Option<ClaimRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLAIMS)?;

        let start = claim_key(channel, from);
        let end = claim_key(channel, u64::MAX);
        for entry in table.range(start.as_slice()..=end.as_slice())? {
            let entry = entry?;
            let record: ClaimRecord = serde_json::from_slice(entry.1.value())?;
            match record.status {
                ClaimStatus::Pending | ClaimStatus::Failed => return Ok(Some(record)),
                ClaimStatus::Submitted | ClaimStatus::Confirmed => continue,
            }
        }
        Ok(None)
    }

    /// Atomically read-modify-write a claim record.
    pub fn update_claim<F>(&self, channel: ChannelId, sequence: u64, f: F) -> StoreResult<ClaimRecord>
    where
        F: FnOnce(&mut ClaimRecord),
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(CLAIMS)?;
            let key = claim_key(channel, sequence);

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(key.as_slice())?
                    .ok_or(StoreError::ClaimNotFound(channel, sequence))?;
                existing.value().to_vec()
            };

            let mut record: ClaimRecord = serde_json::from_slice(&existing_bytes)?;
            f(&mut record);

            let json = serde_json::to_vec(&record)?;
            table.insert(key.as_slice(), json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Mark every Pending/Submitted record with `sequence < cursor` Confirmed.
    ///
    /// The remote cursor having passed a sequence means the claim landed on
    /// the target chain, whether or not this process recorded the submission
    /// (crash reconciliation). Returns the number of records transitioned.
    pub fn confirm_below(&self, channel: ChannelId, cursor: u64) -> StoreResult<usize> {
        if cursor == 0 {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut confirmed = 0usize;
        {
            let mut table = write_txn.open_table(CLAIMS)?;
            let start = claim_key(channel, 0);
            let end = claim_key(channel, cursor - 1);

            // Collect first: redb range guards borrow the table
            let mut to_update: Vec<(Vec<u8>, ClaimRecord)> = Vec::new();
            for entry in table.range(start.as_slice()..=end.as_slice())? {
                let entry = entry?;
                let record: ClaimRecord = serde_json::from_slice(entry.1.value())?;
                match record.status {
                    ClaimStatus::Pending | ClaimStatus::Submitted => {
                        to_update.push((entry.0.value().to_vec(), record));
                    }
                    ClaimStatus::Confirmed | ClaimStatus::Failed => {}
                }
            }

            for (key, mut record) in to_update {
                record.mark_confirmed();
                let json = serde_json::to_vec(&record)?;
                table.insert(key.as_slice(), json.as_slice())?;
                confirmed += 1;
            }
        }
        write_txn.commit()?;
        Ok(confirmed)
    }

    /// Oldest Pending record on a channel, by sequence (stagnation probe).
    pub fn oldest_pending(&self, channel: ChannelId) -> StoreResult<Option<ClaimRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLAIMS)?;

        let start = claim_key(channel, 0);
        let end = claim_key(channel, u64::MAX);
        for entry in table.range(start.as_slice()..=end.as_slice())? {
            let entry = entry?;
            let record: ClaimRecord = serde_json::from_slice(entry.1.value())?;
            if record.status == ClaimStatus::Pending {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Claim counts per status: [pending, submitted, confirmed, failed].
    pub fn status_counts(&self, channel: ChannelId) -> StoreResult<[usize; 4]> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLAIMS)?;

        let mut counts = [0usize; 4];
        let start = claim_key(channel, 0);
        let end = claim_key(channel, u64::MAX);
        for entry in table.range(start.as_slice()..=end.as_slice())? {
            let entry = entry?;
            let record: ClaimRecord = serde_json::from_slice(entry.1.value())?;
            let slot = match record.status {
                ClaimStatus::Pending => 0,
                ClaimStatus::Submitted => 1,
                ClaimStatus::Confirmed => 2,
                ClaimStatus::Failed => 3,
            };
            counts[slot] += 1;
        }
        Ok(counts)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (ClaimStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ClaimStore::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    fn package(channel: ChannelId, sequence: u64, height: u64) -> Package {
        Package {
            channel_id: channel,
            sequence,
            payload: vec![1, 2, 3],
            source_height: height,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn watermark_starts_absent() {
        let (store, _dir) = temp_store();
        assert!(store.watermark(1).unwrap().is_none());
    }

    #[test]
    fn commit_height_persists_packages_and_watermark() {
        let (store, _dir) = temp_store();
        let packages = vec![package(1, 10, 100), package(1, 11, 100)];

        store.commit_height(1, 100, &packages).unwrap();

        let (height, _) = store.watermark(1).unwrap().unwrap();
        assert_eq!(height, 100);

        let record = store.claim(1, 10).unwrap().unwrap();
        assert_eq!(record.status, ClaimStatus::Pending);
        assert_eq!(record.source_height, 100);
        assert!(store.claim(1, 11).unwrap().is_some());
    }

    #[test]
    fn commit_height_with_no_packages_still_advances() {
        let (store, _dir) = temp_store();
        store.commit_height(1, 5, &[]).unwrap();
        store.commit_height(1, 6, &[]).unwrap();
        assert_eq!(store.watermark(1).unwrap().unwrap().0, 6);
    }

    #[test]
    fn watermark_never_regresses() {
        let (store, _dir) = temp_store();
        store.commit_height(1, 100, &[]).unwrap();

        let same = store.commit_height(1, 100, &[package(1, 1, 100)]);
        assert!(matches!(
            same,
            Err(StoreError::WatermarkRegression { current: 100, attempted: 100, .. })
        ));
        let lower = store.commit_height(1, 99, &[]);
        assert!(matches!(lower, Err(StoreError::WatermarkRegression { .. })));

        // Rejected commits must not leak claim records
        assert!(store.claim(1, 1).unwrap().is_none());
        assert_eq!(store.watermark(1).unwrap().unwrap().0, 100);
    }

    #[test]
    fn next_claimable_scans_ascending_and_skips_done() {
        let (store, _dir) = temp_store();
        store
            .commit_height(
                1,
                100,
                &[package(1, 10, 100), package(1, 11, 100), package(1, 12, 100)],
            )
            .unwrap();

        store.update_claim(1, 10, |r| r.mark_confirmed()).unwrap();
        store
            .update_claim(1, 11, |r| r.mark_submitted("0xaaa".into()))
            .unwrap();

        let next = store.next_claimable(1, 0).unwrap().unwrap();
        assert_eq!(next.sequence, 12);

        // from-bound is honored
        assert!(store.next_claimable(1, 13).unwrap().is_none());
    }

    #[test]
    fn next_claimable_returns_failed_records() {
        let (store, _dir) = temp_store();
        store.commit_height(3, 50, &[package(3, 7, 50)]).unwrap();
        store
            .update_claim(3, 7, |r| r.mark_failed("bad payload".into()))
            .unwrap();

        let next = store.next_claimable(3, 0).unwrap().unwrap();
        assert_eq!(next.status, ClaimStatus::Failed);
    }

    #[test]
    fn channels_are_isolated() {
        let (store, _dir) = temp_store();
        store.commit_height(1, 10, &[package(1, 1, 10)]).unwrap();
        store.commit_height(2, 20, &[package(2, 9, 20)]).unwrap();

        assert_eq!(store.watermark(1).unwrap().unwrap().0, 10);
        assert_eq!(store.watermark(2).unwrap().unwrap().0, 20);
        assert_eq!(store.next_claimable(1, 0).unwrap().unwrap().sequence, 1);
        assert_eq!(store.next_claimable(2, 0).unwrap().unwrap().sequence, 9);
    }

    #[test]
    fn update_claim_missing_record_errors() {
        let (store, _dir) = temp_store();
        let result = store.update_claim(5, 99, |r| r.mark_confirmed());
        assert!(matches!(result, Err(StoreError::ClaimNotFound(5, 99))));
    }

    #[test]
    fn confirm_below_reconciles_and_is_idempotent() {
        let (store, _dir) = temp_store();
        store
            .commit_height(
                7,
                100,
                &[package(7, 40, 100), package(7, 41, 100), package(7, 42, 100)],
            )
            .unwrap();
        store
            .update_claim(7, 41, |r| r.mark_submitted("0xbbb".into()))
            .unwrap();

        // Remote cursor is 42: sequences 40 and 41 were already claimed
        assert_eq!(store.confirm_below(7, 42).unwrap(), 2);
        assert_eq!(store.claim(7, 40).unwrap().unwrap().status, ClaimStatus::Confirmed);
        assert_eq!(store.claim(7, 41).unwrap().unwrap().status, ClaimStatus::Confirmed);
        assert_eq!(store.claim(7, 42).unwrap().unwrap().status, ClaimStatus::Pending);

        // Re-running changes nothing
        assert_eq!(store.confirm_below(7, 42).unwrap(), 0);
    }

    #[test]
    fn confirm_below_leaves_failed_untouched() {
        let (store, _dir) = temp_store();
        store.commit_height(7, 100, &[package(7, 40, 100)]).unwrap();
        store
            .update_claim(7, 40, |r| r.mark_failed("rejected".into()))
            .unwrap();

        assert_eq!(store.confirm_below(7, 50).unwrap(), 0);
        assert_eq!(store.claim(7, 40).unwrap().unwrap().status, ClaimStatus::Failed);
    }

    #[test]
    fn status_counts_and_oldest_pending() {
        let (store, _dir) = temp_store();
        store
            .commit_height(
                1,
                100,
                &[package(1, 1, 100), package(1, 2, 100), package(1, 3, 100)],
            )
            .unwrap();
        store.update_claim(1, 1, |r| r.mark_confirmed()).unwrap();
        store
            .update_claim(1, 2, |r| r.mark_submitted("0xccc".into()))
            .unwrap();

        assert_eq!(store.status_counts(1).unwrap(), [1, 1, 1, 0]);
        assert_eq!(store.oldest_pending(1).unwrap().unwrap().sequence, 3);
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.redb");
        {
            let store = ClaimStore::open(&path).unwrap();
            store.commit_height(1, 77, &[package(1, 5, 77)]).unwrap();
        }
        let store = ClaimStore::open(&path).unwrap();
        assert_eq!(store.watermark(1).unwrap().unwrap().0, 77);
        assert_eq!(store.claim(1, 5).unwrap().unwrap().sequence, 5);
    }
}
