//! # Core Type Definitions
//!
//! This module contains the record types shared by every tagstore component:
//! - Input shapes (`ImageItem`, `UserIdentity`)
//! - The canonical record (`TagRecord`) and its tag payload (`TagSet`)
//! - Derived and audit rows (`FailureRow`, `OffensiveLogEntry`)
//! - Error types (`TagError`)
//!
//! ## Defaults
//!
//! Persisted data may come from older writers that omitted fields or wrote
//! `null` and mistyped values. Every `TagRecord` field reads a missing, null,
//! or mistyped value as its default, so such rows still load; `image_id` is
//! checked at the store boundary by [`TagRecord::validate`].

use crate::identity;
use crate::primitives::MAX_IMAGE_ID_LENGTH;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// INPUT SHAPES
// =============================================================================

/// One image/caption pair as handed to the tagging tool.
///
/// Dataset files disagree on field names, so the common aliases are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageItem {
    /// Explicit identifier, if the dataset carries one.
    #[serde(default, alias = "image_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Original filename of the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
    /// Image URL.
    #[serde(default, alias = "image_url", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Caption text.
    #[serde(default, alias = "caption", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ImageItem {
    /// Create an item from a URL and caption.
    #[must_use]
    pub fn new(image: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            image_filename: None,
            image: Some(image.into()),
            text: Some(text.into()),
        }
    }

    /// Image URL, or empty.
    #[must_use]
    pub fn image_url(&self) -> &str {
        self.image.as_deref().unwrap_or_default()
    }

    /// Caption, or empty.
    #[must_use]
    pub fn caption(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// The submitting user as seen by the tagging tool.
///
/// The identity provider normally supplies `uid` and `display_name`; when it
/// does not, both are derived from the email.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserIdentity {
    /// Create an identity from an email only.
    #[must_use]
    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            uid: None,
            display_name: None,
        }
    }

    /// The uid, derived from the email when the provider gave none.
    #[must_use]
    pub fn resolved_uid(&self) -> String {
        self.uid
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| identity::derive_uid(&self.email))
    }

    /// The display name, falling back to the email's local part.
    #[must_use]
    pub fn resolved_display_name(&self) -> String {
        self.display_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| identity::display_name_from_email(&self.email).to_string())
    }
}

// =============================================================================
// TAG SET
// =============================================================================

/// The attribute → value selections for one image.
///
/// Known attributes are typed; anything else a client sends is kept in
/// `extra` so a save never silently drops data. A save replaces the whole
/// set; there is no field-level merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_principle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_principle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub irrelevant: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Attributes outside the known vocabulary, sorted by name.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TagSet {
    /// Create an empty tag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quality rating.
    #[must_use]
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Set the primary element and principle.
    #[must_use]
    pub fn with_primary(mut self, element: impl Into<String>, principle: impl Into<String>) -> Self {
        self.primary_element = Some(element.into());
        self.primary_principle = Some(principle.into());
        self
    }

    /// Add an issue marker.
    #[must_use]
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    /// Check if nothing has been selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Serialize to a compact JSON string (used for CSV cells).
    pub fn to_json_string(&self) -> Result<String, TagError> {
        serde_json::to_string(self).map_err(|e| TagError::SerializationError(e.to_string()))
    }
}

// =============================================================================
// TAG RECORD
// =============================================================================

/// Which failure flag a flag action sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    /// Needs review; stays in circulation.
    Flagged,
    /// Removed from circulation.
    Rejected,
}

/// One user's tagging decision for one image.
///
/// At most one record per `image_id` exists in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Unique key.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub image_id: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub image_url: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub tags: TagSet,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub tagger: String,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    /// Write time. Each save builds a fresh record, so every upsert carries a new one.
    #[serde(default, with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub flagged: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub rejected: bool,
}

impl TagRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(image_id: impl Into<String>, tags: TagSet) -> Self {
        Self {
            image_id: image_id.into(),
            text: String::new(),
            image_url: String::new(),
            tags,
            tagger: String::new(),
            uid: None,
            display_name: None,
            timestamp: Utc::now(),
            flagged: false,
            rejected: false,
        }
    }

    /// Build the record for a tagging save of `item` by `user`.
    #[must_use]
    pub fn for_item(item: &ImageItem, tags: TagSet, user: &UserIdentity) -> Self {
        Self {
            image_id: identity::derive_image_id(item),
            text: item.caption().to_string(),
            image_url: item.image_url().to_string(),
            tags,
            tagger: user.email.clone(),
            uid: Some(user.resolved_uid()),
            display_name: Some(user.resolved_display_name()),
            timestamp: Utc::now(),
            flagged: false,
            rejected: false,
        }
    }

    /// Build the record for a flag action: empty tags, one flag set.
    #[must_use]
    pub fn flag_for_item(item: &ImageItem, user: &UserIdentity, kind: FlagKind) -> Self {
        Self::for_item(item, TagSet::new(), user).with_flag(kind)
    }

    /// Set the flag matching `kind`.
    #[must_use]
    pub fn with_flag(mut self, kind: FlagKind) -> Self {
        match kind {
            FlagKind::Flagged => self.flagged = true,
            FlagKind::Rejected => self.rejected = true,
        }
        self
    }

    /// Set the tagger.
    #[must_use]
    pub fn with_tagger(mut self, tagger: impl Into<String>) -> Self {
        self.tagger = tagger.into();
        self
    }

    /// Set the uid.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Check that the record can enter a store.
    pub fn validate(&self) -> Result<(), TagError> {
        if self.image_id.trim().is_empty() {
            return Err(TagError::InvalidRecord(
                "image_id must not be empty".to_string(),
            ));
        }
        if self.image_id.len() > MAX_IMAGE_ID_LENGTH {
            return Err(TagError::InvalidRecord(format!(
                "image_id length {} exceeds maximum {}",
                self.image_id.len(),
                MAX_IMAGE_ID_LENGTH
            )));
        }
        Ok(())
    }

    /// Check if the record belongs in the failures view.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.flagged || self.rejected
    }

    /// Flag state as a pair, for change detection.
    #[must_use]
    pub fn flag_state(&self) -> (bool, bool) {
        (self.flagged, self.rejected)
    }
}

/// Field reader that maps null and mistyped values to the type's default.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = serde_json::Value::deserialize(d)?;
        Ok(T::deserialize(value).unwrap_or_default())
    }
}

/// Serde adapter for record timestamps.
///
/// Writes RFC 3339 at full precision. Reads RFC 3339 as well as the naive
/// `YYYY-MM-DDTHH:MM:SS[.ffffff]` form older exports used, treating it as UTC.
/// Anything else reads as the epoch default.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(value.as_str().and_then(parse).unwrap_or_default())
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

// =============================================================================
// DERIVED / AUDIT ROWS
// =============================================================================

/// One row of the failures view.
///
/// Column order matches the failures CSV header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRow {
    pub image_id: String,
    pub text: String,
    pub rejected: bool,
    pub flagged: bool,
    pub tagger: String,
    /// The record's tags as compact JSON.
    pub tags: String,
}

impl FailureRow {
    /// Project a record into a failures row.
    pub fn from_record(record: &TagRecord) -> Result<Self, TagError> {
        Ok(Self {
            image_id: record.image_id.clone(),
            text: record.text.clone(),
            rejected: record.rejected,
            flagged: record.flagged,
            tagger: record.tagger.clone(),
            tags: record.tags.to_json_string()?,
        })
    }
}

/// Append-only audit entry for an image reported as offensive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffensiveLogEntry {
    pub timestamp: String,
    pub image_id: String,
    pub image_url: String,
    pub text: String,
    pub flagged_by: String,
}

impl OffensiveLogEntry {
    /// Create an entry for `item` reported by `reporter`, stamped now.
    #[must_use]
    pub fn for_item(item: &ImageItem, reporter: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            image_id: identity::derive_image_id(item),
            image_url: item.image_url().to_string(),
            text: item.caption().to_string(),
            flagged_by: reporter.to_string(),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in tagstore.
///
/// None of these is fatal to a calling process; callers decide how to
/// surface them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// The record cannot enter the store (e.g. missing `image_id`).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A tag set uses a value outside the vocabulary.
    #[error("Invalid tags: {0}")]
    InvalidTags(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The remote mirror failed.
    #[error("Remote error: {0}")]
    RemoteError(String),
}

impl TagError {
    /// Check if retrying the same record can succeed.
    ///
    /// Validation failures are permanent; storage failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRecord(_) | Self::InvalidTags(_))
    }
}

impl From<std::io::Error> for TagError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_image_id_rejected() {
        let record = TagRecord::new("   ", TagSet::new());
        assert!(matches!(record.validate(), Err(TagError::InvalidRecord(_))));
    }

    #[test]
    fn flags_are_independent() {
        let record = TagRecord::new("img", TagSet::new()).with_flag(FlagKind::Flagged);
        assert_eq!(record.flag_state(), (true, false));
        assert!(record.is_failure());

        let both = record.with_flag(FlagKind::Rejected);
        assert_eq!(both.flag_state(), (true, true));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let record: TagRecord =
            serde_json::from_str(r#"{"image_id":"a"}"#).expect("minimal record");
        assert_eq!(record.image_id, "a");
        assert!(record.tags.is_empty());
        assert!(!record.flagged);
        assert!(!record.rejected);
        assert_eq!(record.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn null_and_mistyped_fields_take_defaults() {
        let record: TagRecord = serde_json::from_str(
            r#"{"image_id":"a","text":null,"tags":"High","uid":7,"flagged":"yes","rejected":true,"timestamp":12}"#,
        )
        .expect("lenient record");
        assert_eq!(record.image_id, "a");
        assert_eq!(record.text, "");
        assert!(record.tags.is_empty());
        assert_eq!(record.uid, None);
        assert!(!record.flagged);
        assert!(record.rejected);
        assert_eq!(record.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn naive_timestamp_accepted() {
        let record: TagRecord = serde_json::from_str(
            r#"{"image_id":"a","timestamp":"2024-03-01T10:20:30.123456"}"#,
        )
        .expect("naive timestamp");
        assert_eq!(
            record.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "2024-03-01T10:20:30.123456Z"
        );
    }

    #[test]
    fn unknown_tag_attributes_preserved() {
        let tags: TagSet =
            serde_json::from_str(r#"{"quality":"High","mood":"calm"}"#).expect("tags");
        assert_eq!(tags.quality.as_deref(), Some("High"));
        assert_eq!(
            tags.extra.get("mood"),
            Some(&serde_json::Value::String("calm".to_string()))
        );

        let json = tags.to_json_string().expect("serialize");
        assert!(json.contains("\"mood\":\"calm\""));
    }

    #[test]
    fn item_aliases() {
        let item: ImageItem =
            serde_json::from_str(r#"{"image_url":"http://x/a.png","caption":"hi"}"#)
                .expect("aliases");
        assert_eq!(item.image_url(), "http://x/a.png");
        assert_eq!(item.caption(), "hi");
    }

    #[test]
    fn identity_fallbacks() {
        let user = UserIdentity::from_email("ada@example.com");
        assert_eq!(user.resolved_display_name(), "ada");
        assert!(user.resolved_uid().starts_with("email-"));

        let named = UserIdentity {
            email: "ada@example.com".to_string(),
            uid: Some("u1".to_string()),
            display_name: Some("Ada L.".to_string()),
        };
        assert_eq!(named.resolved_uid(), "u1");
        assert_eq!(named.resolved_display_name(), "Ada L.");
    }

    #[test]
    fn validation_errors_not_retryable() {
        assert!(!TagError::InvalidRecord("x".into()).is_retryable());
        assert!(TagError::IoError("disk".into()).is_retryable());
    }
}
