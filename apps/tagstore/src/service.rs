//! # Tagging Service
//!
//! Wires the record store, per-user write buffers, autosave gates, the
//! offensive log and the consistency bridge into the operations the API and
//! CLI expose.
//!
//! ## Locking
//!
//! - `sessions` (per-user buffer and gate) is locked before `store`
//! - `store` is held for a whole read-modify-write, so writers in this
//!   process never interleave
//! - Both locks are released before any remote call
//!
//! ## Mirror ordering
//!
//! Mirror calls run after the locks are released, so two concurrent writes
//! to the same `image_id` may reach the remote in the opposite order to
//! their local commit. The local store is authoritative; a later write or
//! [`TagService::reconcile`] brings the remote back in line with it.

use crate::config::Config;
use crate::remote::{BridgeState, ConsistencyBridge, MirrorOutcome, ReconcileReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tagstore_core::{
    AutosaveGate, ExportArtifact, ExportFormat, FlagKind, FlushReport, ImageItem, OffensiveLog,
    OffensiveLogEntry, RecordStore, TagError, TagRecord, TagSet, UserIdentity, WriteBuffer,
    export_records, form_hash, validate_tags,
};
use tokio::sync::{Mutex, RwLock};

// =============================================================================
// OUTCOMES
// =============================================================================

/// Counts from one flush, plus how many writes reached the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSummary {
    pub written: usize,
    pub retained: usize,
    pub dropped: usize,
    pub mirrored: usize,
}

/// Result of a save or autosave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub image_id: String,
    /// Whether the form was accepted into the buffer.
    pub saved: bool,
    /// Records still buffered for this user.
    pub pending: usize,
    /// Present when this call flushed.
    pub flush: Option<FlushSummary>,
}

/// Result of a flag or offensive report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagOutcome {
    pub image_id: String,
    pub kind: FlagKind,
    pub mirror: MirrorOutcome,
}

/// Local and remote counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub local_total: usize,
    pub local_user: Option<usize>,
    pub remote_total: usize,
    pub remote_user: Option<usize>,
    pub remote_state: BridgeState,
}

/// Snapshot for `/status` and `tagstore status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub backend: String,
    pub store_dir: Option<PathBuf>,
    pub records: usize,
    pub failures: usize,
    pub active_sessions: usize,
    pub pending_records: usize,
    pub remote_state: BridgeState,
}

// =============================================================================
// SESSIONS
// =============================================================================

/// One user's buffer and autosave gate.
#[derive(Debug)]
struct TaggingSession {
    buffer: WriteBuffer,
    gate: AutosaveGate,
}

/// What an autosave compares between ticks: the image and its tags.
#[derive(Serialize)]
struct FormState<'a> {
    image_id: &'a str,
    tags: &'a TagSet,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Shared tagging service.
#[derive(Debug)]
pub struct TagService {
    store: RwLock<RecordStore>,
    sessions: Mutex<BTreeMap<String, TaggingSession>>,
    bridge: ConsistencyBridge,
    offensive: OffensiveLog,
    threshold: usize,
    autosave_interval: Duration,
}

impl TagService {
    /// Assemble a service from its parts.
    #[must_use]
    pub fn new(
        store: RecordStore,
        bridge: ConsistencyBridge,
        offensive: OffensiveLog,
        threshold: usize,
        autosave_interval: Duration,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            sessions: Mutex::new(BTreeMap::new()),
            bridge,
            offensive,
            threshold,
            autosave_interval,
        }
    }

    /// Open the file-backed store and remote bridge described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, TagError> {
        let store = RecordStore::open(&config.store.dir)?;
        Ok(Self::new(
            store,
            ConsistencyBridge::from_settings(&config.remote),
            OffensiveLog::in_dir(config.offensive_dir()),
            config.buffer.threshold,
            config.autosave_interval(),
        ))
    }

    #[must_use]
    pub fn bridge(&self) -> &ConsistencyBridge {
        &self.bridge
    }

    fn new_session(&self, now: Instant) -> TaggingSession {
        TaggingSession {
            buffer: WriteBuffer::new(self.threshold),
            gate: AutosaveGate::new(self.autosave_interval, now),
        }
    }

    // -------------------------------------------------------------------------
    // Tagging
    // -------------------------------------------------------------------------

    /// Buffer a tagging save; flushes when the user's buffer reaches the threshold.
    pub async fn save(
        &self,
        user: &UserIdentity,
        item: &ImageItem,
        tags: TagSet,
    ) -> Result<SaveOutcome, TagError> {
        validate_tags(&tags)?;
        let record = TagRecord::for_item(item, tags, user);
        let image_id = record.image_id.clone();

        let (report, pending) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(user.resolved_uid())
                .or_insert_with(|| self.new_session(Instant::now()));
            let mut store = self.store.write().await;
            let report = session.buffer.append(record, &mut *store)?;
            (report, session.buffer.len())
        };

        let flush = match report {
            Some(report) => Some(self.mirror_flush(&report).await),
            None => None,
        };
        tracing::info!(image_id = %image_id, pending, flushed = flush.is_some(), "Tags saved");
        Ok(SaveOutcome {
            image_id,
            saved: true,
            pending,
            flush,
        })
    }

    /// Autosave tick at `now`: buffers and flushes the form only when the
    /// user's gate allows it.
    pub async fn autosave_at(
        &self,
        user: &UserIdentity,
        item: &ImageItem,
        tags: TagSet,
        now: Instant,
    ) -> Result<SaveOutcome, TagError> {
        validate_tags(&tags)?;
        let record = TagRecord::for_item(item, tags, user);
        let image_id = record.image_id.clone();
        let hash = form_hash(&FormState {
            image_id: &record.image_id,
            tags: &record.tags,
        })?;

        let (report, pending) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(user.resolved_uid())
                .or_insert_with(|| self.new_session(now));
            if !session.gate.should_save(now, &hash) {
                tracing::debug!(image_id = %image_id, "Autosave suppressed");
                return Ok(SaveOutcome {
                    image_id,
                    saved: false,
                    pending: session.buffer.len(),
                    flush: None,
                });
            }

            let mut store = self.store.write().await;
            let mut report = session
                .buffer
                .append(record, &mut *store)?
                .unwrap_or_default();
            report
                .entries
                .extend(session.buffer.flush(&mut *store).entries);
            if report.retained_count() == 0 {
                session.gate.mark_saved(now, hash);
            }
            (report, session.buffer.len())
        };

        let flush = self.mirror_flush(&report).await;
        tracing::info!(image_id = %image_id, written = flush.written, "Changes autosaved");
        Ok(SaveOutcome {
            image_id,
            saved: true,
            pending,
            flush: Some(flush),
        })
    }

    /// Autosave tick at the current time.
    pub async fn autosave(
        &self,
        user: &UserIdentity,
        item: &ImageItem,
        tags: TagSet,
    ) -> Result<SaveOutcome, TagError> {
        self.autosave_at(user, item, tags, Instant::now()).await
    }

    /// Flush the user's buffer now.
    pub async fn flush(&self, user: &UserIdentity) -> FlushSummary {
        let report = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(&user.resolved_uid()) else {
                return FlushSummary::default();
            };
            let mut store = self.store.write().await;
            session.buffer.flush(&mut *store)
        };
        self.mirror_flush(&report).await
    }

    /// Flush every session (used on shutdown).
    pub async fn flush_all(&self) -> FlushSummary {
        let report = {
            let mut sessions = self.sessions.lock().await;
            let mut store = self.store.write().await;
            let mut combined = FlushReport::default();
            for session in sessions.values_mut() {
                combined
                    .entries
                    .extend(session.buffer.flush(&mut *store).entries);
            }
            combined
        };
        self.mirror_flush(&report).await
    }

    async fn mirror_flush(&self, report: &FlushReport) -> FlushSummary {
        let mut mirrored = 0;
        for record in report.written() {
            if self.bridge.mirror(record).await == MirrorOutcome::Mirrored {
                mirrored += 1;
            }
        }
        FlushSummary {
            written: report.written_count(),
            retained: report.retained_count(),
            dropped: report.dropped_count(),
            mirrored,
        }
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    /// Flag or reject an image. Bypasses the buffer: the store is written
    /// immediately, the failures view refreshed, then the record mirrored.
    pub async fn flag(
        &self,
        user: &UserIdentity,
        item: &ImageItem,
        kind: FlagKind,
    ) -> Result<FlagOutcome, TagError> {
        let record = TagRecord::flag_for_item(item, user, kind);
        {
            let mut store = self.store.write().await;
            store.upsert(record.clone())?;
            store.materialize_failures()?;
        }
        let mirror = self.bridge.mirror(&record).await;
        tracing::info!(image_id = %record.image_id, kind = ?kind, "Image flagged");
        Ok(FlagOutcome {
            image_id: record.image_id,
            kind,
            mirror,
        })
    }

    /// Log an offensive image, then reject it.
    ///
    /// The log entry stays even if the reject fails.
    pub async fn mark_offensive(
        &self,
        user: &UserIdentity,
        item: &ImageItem,
    ) -> Result<FlagOutcome, TagError> {
        let entry = OffensiveLogEntry::for_item(item, &user.email);
        self.offensive.append(&entry)?;
        self.flag(user, item, FlagKind::Rejected).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Local counts, and remote counts when a remote is configured.
    pub async fn counts(&self, uid: Option<&str>) -> Result<Counts, TagError> {
        let (local_total, local_user) = {
            let store = self.store.read().await;
            let total = store.count_total()?;
            let user = uid.map(|u| store.count_by_user(u)).transpose()?;
            (total, user)
        };
        let remote_total = self.bridge.count_remote_total().await;
        let remote_user = match uid {
            Some(u) => Some(self.bridge.count_remote_by_user(u).await),
            None => None,
        };
        Ok(Counts {
            local_total,
            local_user,
            remote_total,
            remote_user,
            remote_state: self.bridge.state(),
        })
    }

    /// Render the store in `format`.
    pub async fn export(&self, format: ExportFormat) -> Result<ExportArtifact, TagError> {
        let records = self.store.read().await.records()?;
        export_records(&records, format)
    }

    /// All records, in collection order.
    pub async fn records(&self) -> Result<Vec<TagRecord>, TagError> {
        self.store.read().await.records()
    }

    /// The committed record for `image_id`. Buffered saves are not visible
    /// until flushed.
    pub async fn get_record(&self, image_id: &str) -> Result<Option<TagRecord>, TagError> {
        self.store.read().await.get(image_id)
    }

    /// Records whose `uid` is `uid`, in collection order.
    pub async fn records_for_user(&self, uid: &str) -> Result<Vec<TagRecord>, TagError> {
        let mut records = self.records().await?;
        records.retain(|r| r.uid.as_deref() == Some(uid));
        Ok(records)
    }

    /// Push every local record to the remote.
    pub async fn reconcile(&self) -> Result<ReconcileReport, TagError> {
        let records = self.records().await?;
        let report = self.bridge.reconcile(&records).await;
        tracing::info!(
            mirrored = report.mirrored,
            failed = report.failed,
            skipped = report.skipped,
            "Reconcile finished"
        );
        Ok(report)
    }

    /// Current store and bridge state.
    pub async fn status(&self) -> Result<ServiceStatus, TagError> {
        let (active_sessions, pending_records) = {
            let sessions = self.sessions.lock().await;
            let pending = sessions.values().map(|s| s.buffer.len()).sum();
            (sessions.len(), pending)
        };
        let store = self.store.read().await;
        let records = store.records()?;
        Ok(ServiceStatus {
            backend: store.backend_name().to_string(),
            store_dir: store.paths().map(|p| p.dir.clone()),
            records: records.len(),
            failures: records.iter().filter(|r| r.is_failure()).count(),
            active_sessions,
            pending_records,
            remote_state: self.bridge.state(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
