//! # Formats
//!
//! Pure encode/decode for the on-disk representations. File placement and
//! locking live in the store; this module only turns records into bytes and
//! back.

pub mod persistence;
pub mod tabular;

pub use persistence::{DecodedCollection, decode_collection, encode_collection, write_atomic};
pub use tabular::{failures_to_csv, offensive_to_csv, records_to_csv};
