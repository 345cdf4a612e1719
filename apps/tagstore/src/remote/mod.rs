//! # Consistency Bridge
//!
//! Best-effort mirror of local store writes into a remote document store,
//! plus remote counts.
//!
//! ## State
//!
//! ```text
//! Unconfigured ──(settings present)──► Initializing ──(client built)──► Ready
//!                                           │                            ▲ │
//!                                           └──(client failed)──► Unconfigured
//!                                                                success │ │ failure
//!                                                                        │ ▼
//!                                                                      Degraded
//! ```
//!
//! Ready and Degraded are inferred per call; there is no health-check loop.
//! Nothing here ever fails a caller: mirror errors are logged, remote counts
//! fall back to zero.

pub mod client;
pub mod retry;

pub use client::{ClientError, RemoteClient};
pub use retry::{RetryPolicy, with_retry};

use crate::config::RemoteSection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use tagstore_core::{TagRecord, sanitize_key};

// =============================================================================
// BRIDGE STATE
// =============================================================================

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// No remote configured; local-only mode.
    Unconfigured,
    /// Settings found, client not built yet.
    Initializing,
    /// Last remote call succeeded (or none failed yet).
    Ready,
    /// Last remote call failed.
    Degraded,
}

impl BridgeState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Unconfigured => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Degraded => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Degraded,
            _ => Self::Unconfigured,
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Result of one mirror attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorOutcome {
    Mirrored,
    /// No remote configured.
    LocalOnly,
    /// Remote write failed; the local write stands.
    Failed,
}

/// Totals from a reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub mirrored: usize,
    pub failed: usize,
    pub skipped: usize,
}

// =============================================================================
// CONSISTENCY BRIDGE
// =============================================================================

/// Mirror of the record store in a remote keyed collection.
#[derive(Debug)]
pub struct ConsistencyBridge {
    client: Option<RemoteClient>,
    state: AtomicU8,
    read_policy: RetryPolicy,
}

impl ConsistencyBridge {
    /// A bridge with no remote: every mirror is local-only.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            client: None,
            state: AtomicU8::new(BridgeState::Unconfigured.as_u8()),
            read_policy: RetryPolicy::default(),
        }
    }

    /// Build a bridge from `[remote]` settings.
    ///
    /// Missing or unusable settings leave the bridge unconfigured.
    #[must_use]
    pub fn from_settings(settings: &RemoteSection) -> Self {
        let mut bridge = Self::unconfigured();
        bridge.read_policy = RetryPolicy::with_attempts(settings.max_read_attempts);
        if settings.database_url.is_none() {
            tracing::info!("Remote mirror not configured; running local-only");
            return bridge;
        }

        bridge.set_state(BridgeState::Initializing);
        match RemoteClient::new(settings) {
            Ok(client) => {
                tracing::info!(url = %client.base_url(), collection = %settings.collection, "Remote mirror ready");
                bridge.client = Some(client);
                bridge.set_state(BridgeState::Ready);
            }
            Err(e) => {
                tracing::warn!(event = "bridge_init_failed", error = %e, "Remote mirror disabled");
                bridge.set_state(BridgeState::Unconfigured);
            }
        }
        bridge
    }

    /// Override the read retry policy.
    #[must_use]
    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn set_state(&self, state: BridgeState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn record_success(&self) {
        if self.state() == BridgeState::Degraded {
            tracing::info!(event = "bridge_recovered", "Remote mirror reachable again");
        }
        self.set_state(BridgeState::Ready);
    }

    fn record_failure(&self, error: &ClientError) {
        if self.state() != BridgeState::Degraded {
            tracing::warn!(event = "bridge_degraded", error = %error, "Remote mirror degraded");
        }
        self.set_state(BridgeState::Degraded);
    }

    /// Mirror one record under its sanitized id. Never retried, never fails.
    pub async fn mirror(&self, record: &TagRecord) -> MirrorOutcome {
        let Some(client) = &self.client else {
            return MirrorOutcome::LocalOnly;
        };
        let key = sanitize_key(&record.image_id);
        let document = match serde_json::to_value(record) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(event = "mirror_failed", image_id = %record.image_id, error = %e, "Cannot encode record for mirror");
                return MirrorOutcome::Failed;
            }
        };

        match client.patch_document(&key, &document).await {
            Ok(()) => {
                self.record_success();
                tracing::debug!(image_id = %record.image_id, key = %key, "Record mirrored");
                MirrorOutcome::Mirrored
            }
            Err(e) => {
                self.record_failure(&e);
                tracing::warn!(
                    event = "mirror_failed",
                    image_id = %record.image_id,
                    error = %e,
                    "Remote mirror write failed; local write kept"
                );
                MirrorOutcome::Failed
            }
        }
    }

    /// Mirror every record in order.
    pub async fn reconcile(&self, records: &[TagRecord]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for record in records {
            match self.mirror(record).await {
                MirrorOutcome::Mirrored => report.mirrored += 1,
                MirrorOutcome::Failed => report.failed += 1,
                MirrorOutcome::LocalOnly => report.skipped += 1,
            }
        }
        report
    }

    /// Distinct remote documents whose `uid` is `uid`; 0 on any failure.
    pub async fn count_remote_by_user(&self, uid: &str) -> usize {
        self.fetch_documents()
            .await
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| doc.get("uid").and_then(Value::as_str) == Some(uid))
                    .map(|(key, _)| key.as_str())
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    /// Distinct remote documents; 0 on any failure.
    pub async fn count_remote_total(&self) -> usize {
        self.fetch_documents()
            .await
            .map(|docs| docs.iter().map(|(key, _)| key.as_str()).collect::<BTreeSet<_>>().len())
            .unwrap_or(0)
    }

    /// Read the collection as `(key, document)` pairs, with retry.
    async fn fetch_documents(&self) -> Option<Vec<(String, Value)>> {
        let client = self.client.as_ref()?;
        match with_retry(&self.read_policy, || client.fetch_collection()).await {
            Ok(value) => {
                self.record_success();
                Some(documents(value))
            }
            Err(e) => {
                self.record_failure(&e);
                tracing::warn!(event = "remote_read_failed", error = %e, "Remote count unavailable; reporting 0");
                None
            }
        }
    }
}

/// Flatten a collection read into keyed documents.
///
/// An object maps keys to documents; an array (sparse numeric keys) uses
/// the index as key; anything else is empty.
fn documents(value: Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| v.is_object()).collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| v.is_object())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
