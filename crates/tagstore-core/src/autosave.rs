//! # Autosave Gate
//!
//! Debounce for time-triggered saves of an in-progress form.
//!
//! A tick may save only when strictly more than the interval has passed since
//! the last save *and* the form's content hash differs from the hash recorded
//! at that save. The gate starts its clock when it is created and has no
//! recorded hash, so the first eligible tick always saves.
//!
//! Time is passed in by the caller; the gate never reads a clock.

use crate::identity::content_hash;
use crate::primitives::DEFAULT_AUTOSAVE_INTERVAL_SECS;
use crate::TagError;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Hex BLAKE3 of the form's JSON serialization.
///
/// Struct fields serialize in declaration order and extra tag attributes are
/// kept sorted, so equal forms hash equally.
pub fn form_hash<T: Serialize>(form: &T) -> Result<String, TagError> {
    let bytes = serde_json::to_vec(form).map_err(|e| TagError::SerializationError(e.to_string()))?;
    Ok(content_hash(&bytes))
}

/// Per-session autosave state.
#[derive(Debug, Clone)]
pub struct AutosaveGate {
    interval: Duration,
    last_save: Instant,
    last_hash: Option<String>,
}

impl AutosaveGate {
    /// Create a gate whose clock starts at `now`.
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_save: now,
            last_hash: None,
        }
    }

    /// Create a gate with the default interval.
    #[must_use]
    pub fn with_default_interval(now: Instant) -> Self {
        Self::new(Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS), now)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Hash recorded at the last save.
    #[must_use]
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Check if a form with `hash` should be saved at `now`.
    #[must_use]
    pub fn should_save(&self, now: Instant, hash: &str) -> bool {
        let elapsed = now.saturating_duration_since(self.last_save);
        elapsed > self.interval && self.last_hash.as_deref() != Some(hash)
    }

    /// Record a save of the form with `hash` at `now`.
    pub fn mark_saved(&mut self, now: Instant, hash: impl Into<String>) {
        self.last_save = now;
        self.last_hash = Some(hash.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagSet;

    fn gate(start: Instant) -> AutosaveGate {
        AutosaveGate::new(Duration::from_secs(30), start)
    }

    #[test]
    fn suppressed_before_interval() {
        let start = Instant::now();
        let gate = gate(start);
        assert!(!gate.should_save(start + Duration::from_secs(30), "h1"));
        assert!(gate.should_save(start + Duration::from_secs(31), "h1"));
    }

    #[test]
    fn suppressed_when_unchanged() {
        let start = Instant::now();
        let mut gate = gate(start);
        let later = start + Duration::from_secs(31);
        gate.mark_saved(later, "h1");

        let much_later = later + Duration::from_secs(120);
        assert!(!gate.should_save(much_later, "h1"));
        assert!(gate.should_save(much_later, "h2"));
    }

    #[test]
    fn form_hash_is_stable_and_content_sensitive() {
        let a = TagSet::new().with_quality("High");
        let b = TagSet::new().with_quality("High");
        let c = TagSet::new().with_quality("Low");

        assert_eq!(form_hash(&a).expect("a"), form_hash(&b).expect("b"));
        assert_ne!(form_hash(&a).expect("a"), form_hash(&c).expect("c"));
        assert_eq!(form_hash(&a).expect("a").len(), 64);
    }
}
