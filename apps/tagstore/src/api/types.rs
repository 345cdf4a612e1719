//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! The caller identifies the tagging user in each request body; sign-in is
//! handled upstream.

use crate::remote::{BridgeState, MirrorOutcome};
use crate::service::{Counts, FlagOutcome, FlushSummary, SaveOutcome, ServiceStatus};
use serde::{Deserialize, Serialize};
use tagstore_core::vocabulary::{
    ELEMENT_OPTIONS, ISSUE_OPTIONS, PRINCIPLE_OPTIONS, QUALITY_OPTIONS, REFERENCE_TERMS,
    ReferenceTerm,
};
use tagstore_core::{ExportArtifact, FlagKind, ImageItem, TagRecord, TagSet, UserIdentity};

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub backend: Option<String>,
    pub records: usize,
    pub failures: usize,
    pub active_sessions: usize,
    pub pending_records: usize,
    pub remote_state: Option<BridgeState>,
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn success(status: ServiceStatus) -> Self {
        Self {
            success: true,
            backend: Some(status.backend),
            records: status.records,
            failures: status.failures,
            active_sessions: status.active_sessions,
            pending_records: status.pending_records,
            remote_state: Some(status.remote_state),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            backend: None,
            records: 0,
            failures: 0,
            active_sessions: 0,
            pending_records: 0,
            remote_state: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// VOCABULARY
// =============================================================================

/// The tag options a form offers.
#[derive(Debug, Clone, Serialize)]
pub struct VocabularyResponse {
    pub elements: Vec<&'static str>,
    pub principles: Vec<&'static str>,
    pub quality: Vec<&'static str>,
    pub issues: Vec<&'static str>,
    pub reference: Vec<ReferenceTerm>,
}

impl Default for VocabularyResponse {
    fn default() -> Self {
        Self {
            elements: ELEMENT_OPTIONS.to_vec(),
            principles: PRINCIPLE_OPTIONS.to_vec(),
            quality: QUALITY_OPTIONS.to_vec(),
            issues: ISSUE_OPTIONS.to_vec(),
            reference: REFERENCE_TERMS.to_vec(),
        }
    }
}

// =============================================================================
// SAVE / AUTOSAVE / FLUSH
// =============================================================================

/// Tag save or autosave request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub user: UserIdentity,
    pub item: ImageItem,
    #[serde(default)]
    pub tags: TagSet,
}

/// Tag save response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub image_id: Option<String>,
    pub saved: bool,
    pub pending: usize,
    pub flush: Option<FlushSummary>,
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn success(outcome: SaveOutcome) -> Self {
        Self {
            success: true,
            image_id: Some(outcome.image_id),
            saved: outcome.saved,
            pending: outcome.pending,
            flush: outcome.flush,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            image_id: None,
            saved: false,
            pending: 0,
            flush: None,
            error: Some(msg.into()),
        }
    }
}

/// Flush request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushRequest {
    pub user: UserIdentity,
}

/// Flush response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: FlushSummary,
}

// =============================================================================
// FLAG / OFFENSIVE
// =============================================================================

fn default_flag_kind() -> FlagKind {
    FlagKind::Flagged
}

/// Flag request; `kind` defaults to `flagged`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRequest {
    pub user: UserIdentity,
    pub item: ImageItem,
    #[serde(default = "default_flag_kind")]
    pub kind: FlagKind,
}

/// Offensive report request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffensiveRequest {
    pub user: UserIdentity,
    pub item: ImageItem,
}

/// Flag or offensive report response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResponse {
    pub success: bool,
    pub image_id: Option<String>,
    pub kind: Option<FlagKind>,
    pub mirror: Option<MirrorOutcome>,
    pub error: Option<String>,
}

impl FlagResponse {
    pub fn success(outcome: FlagOutcome) -> Self {
        Self {
            success: true,
            image_id: Some(outcome.image_id),
            kind: Some(outcome.kind),
            mirror: Some(outcome.mirror),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            image_id: None,
            kind: None,
            mirror: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// `GET /tags?uid=...`; without `uid` every record is listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsQuery {
    pub uid: Option<String>,
}

/// One committed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    pub record: Option<TagRecord>,
    pub error: Option<String>,
}

impl RecordResponse {
    pub fn success(record: TagRecord) -> Self {
        Self {
            success: true,
            record: Some(record),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            record: None,
            error: Some(msg.into()),
        }
    }
}

/// Committed records in collection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub success: bool,
    pub count: usize,
    pub records: Vec<TagRecord>,
    pub error: Option<String>,
}

impl RecordsResponse {
    pub fn success(records: Vec<TagRecord>) -> Self {
        Self {
            success: true,
            count: records.len(),
            records,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            records: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// COUNTS
// =============================================================================

/// `GET /counts?uid=...`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountsQuery {
    pub uid: Option<String>,
}

/// Counts response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub counts: Option<Counts>,
    pub error: Option<String>,
}

impl CountsResponse {
    pub fn success(counts: Counts) -> Self {
        Self {
            success: true,
            counts: Some(counts),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            counts: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT
// =============================================================================

fn default_export_format() -> String {
    "json".to_string()
}

/// Export request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_export_format")]
    pub format: String,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            format: default_export_format(),
        }
    }
}

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub format: Option<String>,
    pub data: Option<String>, // Base64 encoded
    /// BLAKE3 hex digest of the decoded data.
    pub checksum: Option<String>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(artifact: ExportArtifact) -> Self {
        Self {
            success: true,
            format: Some(artifact.format.to_string()),
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &artifact.bytes,
            )),
            checksum: Some(artifact.checksum),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            format: None,
            data: None,
            checksum: None,
            error: Some(msg.into()),
        }
    }
}
