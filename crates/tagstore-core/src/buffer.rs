//! # Write Buffer
//!
//! Session-local batching in front of a [`TagSink`].
//!
//! - Appends are kept in arrival order
//! - Reaching the threshold triggers exactly one flush
//! - A flush hands the whole buffer to the sink in one batch call
//! - Records the sink failed to store stay buffered for the next flush
//! - Records the sink rejected as invalid are dropped and reported
//!
//! The buffer is owned by one session; it is never shared or global.

use crate::primitives::DEFAULT_FLUSH_THRESHOLD;
use crate::store::{TagSink, Upsert};
use crate::{TagError, TagRecord};

// =============================================================================
// FLUSH REPORT
// =============================================================================

/// What happened to one record during a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Stored.
    Written(Upsert),
    /// Storage failed; the record is still buffered.
    Retained(TagError),
    /// Rejected as invalid; the record is gone.
    Dropped(TagError),
}

/// Per-record result of a flush, in buffer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub entries: Vec<(TagRecord, FlushOutcome)>,
}

impl FlushReport {
    /// Records that reached the sink, in order.
    pub fn written(&self) -> impl Iterator<Item = &TagRecord> {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, FlushOutcome::Written(_)))
            .map(|(r, _)| r)
    }

    #[must_use]
    pub fn written_count(&self) -> usize {
        self.written().count()
    }

    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, FlushOutcome::Retained(_)))
            .count()
    }

    #[must_use]
    pub fn dropped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, FlushOutcome::Dropped(_)))
            .count()
    }

    /// Check if every record was written.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, o)| matches!(o, FlushOutcome::Written(_)))
    }
}

// =============================================================================
// WRITE BUFFER
// =============================================================================

/// Ordered in-memory batch of pending records.
#[derive(Debug, Clone)]
pub struct WriteBuffer {
    pending: Vec<TagRecord>,
    threshold: usize,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl WriteBuffer {
    /// Create a buffer that flushes at `threshold` records (minimum 1).
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Records waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> &[TagRecord] {
        &self.pending
    }

    /// Buffer `record`, flushing if the threshold is reached.
    ///
    /// A record without `image_id` is rejected here and never buffered.
    /// Returns the flush report when this append triggered a flush.
    pub fn append(
        &mut self,
        record: TagRecord,
        sink: &mut impl TagSink,
    ) -> Result<Option<FlushReport>, TagError> {
        record.validate()?;
        self.pending.push(record);
        if self.pending.len() >= self.threshold {
            return Ok(Some(self.flush(sink)));
        }
        Ok(None)
    }

    /// Deliver every buffered record to `sink` in one batch.
    pub fn flush(&mut self, sink: &mut impl TagSink) -> FlushReport {
        if self.pending.is_empty() {
            return FlushReport::default();
        }

        let batch = std::mem::take(&mut self.pending);
        let mut results = sink.upsert_batch(&batch).into_iter();
        let mut report = FlushReport::default();

        for record in batch {
            let result = results
                .next()
                .unwrap_or_else(|| Err(TagError::IoError("sink returned no result".to_string())));
            let outcome = match result {
                Ok(upsert) => FlushOutcome::Written(upsert),
                Err(e) if e.is_retryable() => {
                    self.pending.push(record.clone());
                    FlushOutcome::Retained(e)
                }
                Err(e) => FlushOutcome::Dropped(e),
            };
            report.entries.push((record, outcome));
        }

        if !report.is_clean() {
            tracing::warn!(
                event = "flush_incomplete",
                written = report.written_count(),
                retained = report.retained_count(),
                dropped = report.dropped_count(),
                "Flush did not store every record"
            );
        } else {
            tracing::debug!(written = report.written_count(), "Buffer flushed");
        }
        report
    }
}

// =============================================================================
// TESTS
// =============================================================================
