//! # tagstore-core
//!
//! Persistence for crowdsourced image tagging - THE STORE.
//!
//! This crate owns the canonical `image_id → TagRecord` collection and
//! everything derived from it:
//! - `store`: Record Store with idempotent upsert over memory or files
//! - `buffer`: per-session Write Buffer with threshold flush
//! - `autosave`: debounce gate for time-triggered saves
//! - `export`: failures view and checksummed export artifacts
//! - `offensive`: append-only audit log
//!
//! ## Architectural Constraints
//!
//! - Synchronous: NO async, NO network dependencies
//! - The JSON collection is authoritative; every CSV is regenerated from it
//! - At most one record per `image_id`, last write wins
//! - Nothing here is global; callers own their stores and buffers

// =============================================================================
// MODULES
// =============================================================================

pub mod autosave;
pub mod buffer;
pub mod export;
pub mod formats;
pub mod identity;
pub mod offensive;
pub mod primitives;
pub mod store;
pub mod types;
pub mod vocabulary;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    FailureRow, FlagKind, ImageItem, OffensiveLogEntry, TagError, TagRecord, TagSet, UserIdentity,
};

// =============================================================================
// RE-EXPORTS: Store, Buffer, Export
// =============================================================================

pub use autosave::{AutosaveGate, form_hash};
pub use buffer::{FlushOutcome, FlushReport, WriteBuffer};
pub use export::{ExportArtifact, ExportFormat, FailureView, export_records};
pub use identity::{content_hash, derive_image_id, derive_uid, sanitize_key};
pub use offensive::OffensiveLog;
pub use store::{RecordStore, StoreBackend, StorePaths, TagSink, Upsert};
pub use vocabulary::validate_tags;
