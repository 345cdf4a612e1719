//! # Identifier Derivation
//!
//! Deterministic keys for images and users.
//!
//! Every derived value is a BLAKE3 digest of UTF-8 input, so the same image
//! or email yields the same key on every platform and in every language that
//! implements BLAKE3.

use crate::primitives::DERIVED_ID_HEX_LEN;
use crate::types::ImageItem;

/// Hex-encoded BLAKE3 digest of `input`.
#[must_use]
pub fn content_hash(input: &[u8]) -> String {
    blake3::hash(input).to_hex().to_string()
}

fn short_hash(input: &[u8]) -> String {
    let mut hex = content_hash(input);
    hex.truncate(DERIVED_ID_HEX_LEN);
    hex
}

/// Derive the stable `image_id` for an item.
///
/// Precedence:
/// 1. explicit `id` / `image_id`
/// 2. `image_filename`
/// 3. last path segment of the image URL, `.` replaced by `_`
/// 4. `h_` + truncated BLAKE3 of `image_url + "\n" + caption`
#[must_use]
pub fn derive_image_id(item: &ImageItem) -> String {
    if let Some(id) = item.id.as_deref().filter(|s| !s.trim().is_empty()) {
        return id.to_string();
    }
    if let Some(name) = item.image_filename.as_deref().filter(|s| !s.trim().is_empty()) {
        return name.to_string();
    }
    if let Some(segment) = url_suffix(item.image_url()) {
        return segment.replace('.', "_");
    }
    let material = format!("{}\n{}", item.image_url(), item.caption());
    format!("h_{}", short_hash(material.as_bytes()))
}

/// Last non-empty path segment of a URL, without query or fragment.
fn url_suffix(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, p)| p).unwrap_or_default())
        .unwrap_or(without_query);
    path.rsplit('/').find(|s| !s.is_empty())
}

/// Make an `image_id` safe as a remote document key.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`.
#[must_use]
pub fn sanitize_key(image_id: &str) -> String {
    image_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive a uid for a user the identity provider gave none for.
#[must_use]
pub fn derive_uid(email: &str) -> String {
    format!("email-{}", short_hash(email.trim().to_lowercase().as_bytes()))
}

/// Display name fallback: the local part of an email.
#[must_use]
pub fn display_name_from_email(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

// =============================================================================
// TESTS
// =============================================================================
