// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Oracle Relayer - ASC to AFC Cross-Chain Claim Relayer
//!
//! This crate watches the ASC source chain for cross-chain package events,
//! waits for them to reach finality, persists them in an embedded redb store,
//! and submits the corresponding signed claims on the AFC target chain,
//! exactly once and in per-channel sequence order.
//!
//! ## Modules
//!
//! - `observer` - Source-chain scanner (finality-aware, checkpointed)
//! - `relayer` - Sequenced claim submitter with remote-cursor reconciliation
//! - `afc` - Target-chain client pool, claim signing, key management
//! - `store` - Durable claim records and scan watermarks (redb)
//! - `alert` - Latched operator alerts (Telegram, PagerDuty)
//! - `api` - Read-only admin HTTP listener (Axum)

pub mod afc;
pub mod alert;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod observer;
pub mod relayer;
pub mod secrets;
pub mod state;
pub mod store;
