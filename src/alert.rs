// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operational alerting.
//!
//! Alerts go out through Telegram and/or PagerDuty; when neither is
//! configured the message is logged instead so tests and local runs stay
//! quiet. Stagnation-style conditions use [`Alerter::raise`] with a latch
//! key: the alert fires once when the condition starts and re-arms only
//! after [`Alerter::clear`], so a stuck chain does not page every cycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AlertConfig;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_SECS: u64 = 2;
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Alert sender with once-per-onset latching.
#[derive(Clone)]
pub struct Alerter {
    config: AlertConfig,
    client: Client,
    telegram_api_base: String,
    latches: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for Alerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alerter")
            .field("moniker", &self.config.moniker)
            .field("telegram", &self.telegram_configured())
            .field("pagerduty", &self.pagerduty_configured())
            .finish()
    }
}

impl Alerter {
    pub fn new(config: AlertConfig) -> Self {
        let telegram_api_base = format!("https://api.telegram.org/bot{}", config.telegram_bot_id);
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            telegram_api_base,
            latches: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn telegram_configured(&self) -> bool {
        !self.config.telegram_bot_id.is_empty() && !self.config.telegram_chat_id.is_empty()
    }

    fn pagerduty_configured(&self) -> bool {
        !self.config.pager_duty_auth_token.is_empty()
    }

    /// Raise a latched alert: sends only if `key` is not already latched.
    /// Returns whether a message was actually sent.
    pub async fn raise(&self, key: &str, text: &str) -> bool {
        {
            let mut latches = self.latches.lock().unwrap_or_else(|e| e.into_inner());
            if !latches.insert(key.to_string()) {
                return false;
            }
        }
        self.notify(text).await;
        true
    }

    /// Re-arm a latched alert after the condition recovers.
    pub fn clear(&self, key: &str) {
        let mut latches = self.latches.lock().unwrap_or_else(|e| e.into_inner());
        latches.remove(key);
    }

    /// Whether `key` is currently latched.
    pub fn is_latched(&self, key: &str) -> bool {
        let latches = self.latches.lock().unwrap_or_else(|e| e.into_inner());
        latches.contains(key)
    }

    /// Send an unlatched alert through every configured channel.
    pub async fn notify(&self, text: &str) {
        let message = format!("[{}] {}", self.config.moniker, text);

        if !self.telegram_configured() && !self.pagerduty_configured() {
            info!("alert (no channel configured): {}", message);
            return;
        }

        if self.telegram_configured() {
            self.send_telegram(&message).await;
        }
        if self.pagerduty_configured() {
            self.send_pagerduty(&message).await;
        }
    }

    async fn send_telegram(&self, text: &str) {
        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(format!("{}/sendMessage", self.telegram_api_base))
                .json(&json!({
                    "chat_id": self.config.telegram_chat_id,
                    "text": text,
                    "disable_web_page_preview": true,
                }))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    warn!(
                        attempt = attempt + 1,
                        status = %resp.status(),
                        "telegram alert send failed"
                    );
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "telegram alert send failed");
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS * (attempt as u64 + 1)))
                    .await;
            }
        }
        warn!("failed to send telegram alert after {} attempts", MAX_RETRIES);
    }

    async fn send_pagerduty(&self, text: &str) {
        let body = json!({
            "routing_key": self.config.pager_duty_auth_token,
            "event_action": "trigger",
            "payload": {
                "summary": text,
                "source": self.config.moniker,
                "severity": "warning",
            }
        });

        match self.client.post(PAGERDUTY_EVENTS_URL).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), "pagerduty alert send failed"),
            Err(e) => warn!(error = %e, "pagerduty alert send failed"),
        }
    }
}
