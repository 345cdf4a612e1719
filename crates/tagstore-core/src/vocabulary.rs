//! # Tag Vocabulary
//!
//! The closed set of values the tagging form offers, with the short reference
//! text shown next to each element and principle.
//!
//! The store accepts any [`TagSet`]; [`validate_tags`] is applied at the API
//! boundary so bad values are rejected before they are buffered.

use crate::primitives::MAX_NOTES_LENGTH;
use crate::{TagError, TagSet};
use serde::Serialize;

/// Whether a reference entry is an element or a principle of design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Element,
    Principle,
}

/// One element or principle with its reference description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceTerm {
    pub name: &'static str,
    pub kind: TermKind,
    pub description: &'static str,
}

/// Placeholder a form sends for an unset secondary selection.
pub const NONE_OPTION: &str = "None";

pub const ELEMENT_OPTIONS: [&str; 7] = ["Line", "Shape", "Form", "Color", "Value", "Space", "Texture"];

pub const PRINCIPLE_OPTIONS: [&str; 8] = [
    "Balance",
    "Emphasis",
    "Movement",
    "Pattern & Repetition",
    "Rhythm",
    "Proportion",
    "Variety",
    "Unity",
];

pub const QUALITY_OPTIONS: [&str; 3] = ["High", "Medium", "Low"];

pub const ISSUE_OPTIONS: [&str; 4] = ["blurry", "watermark", "text_overlay", "irrelevant"];

pub const REFERENCE_TERMS: [ReferenceTerm; 15] = [
    ReferenceTerm {
        name: "Line",
        kind: TermKind::Element,
        description: "A straight or curved mark that connects two points and can imply direction.",
    },
    ReferenceTerm {
        name: "Shape",
        kind: TermKind::Element,
        description: "Two-dimensional enclosed areas that can be geometric or organic.",
    },
    ReferenceTerm {
        name: "Form",
        kind: TermKind::Element,
        description: "Three-dimensional objects with volume and thickness.",
    },
    ReferenceTerm {
        name: "Color",
        kind: TermKind::Element,
        description: "Visual perception based on wavelengths of light (hue, saturation, value).",
    },
    ReferenceTerm {
        name: "Value",
        kind: TermKind::Element,
        description: "The lightness or darkness of tones or colors.",
    },
    ReferenceTerm {
        name: "Space",
        kind: TermKind::Element,
        description: "The area between or around objects in a composition.",
    },
    ReferenceTerm {
        name: "Texture",
        kind: TermKind::Element,
        description: "The perceived surface quality of a work (actual or implied).",
    },
    ReferenceTerm {
        name: "Balance",
        kind: TermKind::Principle,
        description: "Distribution of visual weight to create stability: symmetrical, asymmetrical, or radial.",
    },
    ReferenceTerm {
        name: "Emphasis",
        kind: TermKind::Principle,
        description: "Focal points that draw attention to key areas in a composition.",
    },
    ReferenceTerm {
        name: "Movement",
        kind: TermKind::Principle,
        description: "How the eye travels through an artwork, often leading the viewer's gaze.",
    },
    ReferenceTerm {
        name: "Pattern & Repetition",
        kind: TermKind::Principle,
        description: "Repeating elements (shapes, lines, colors) to create rhythm or structure.",
    },
    ReferenceTerm {
        name: "Rhythm",
        kind: TermKind::Principle,
        description: "A visual tempo or beat created through repetition or variation.",
    },
    ReferenceTerm {
        name: "Proportion",
        kind: TermKind::Principle,
        description: "The relative size and scale of elements in a composition.",
    },
    ReferenceTerm {
        name: "Variety",
        kind: TermKind::Principle,
        description: "Using diverse elements to create visual interest and break monotony.",
    },
    ReferenceTerm {
        name: "Unity",
        kind: TermKind::Principle,
        description: "Harmony among all parts of a design to create a sense of completeness.",
    },
];

fn check(field: &str, value: Option<&str>, allowed: &[&str], allow_none: bool) -> Result<(), TagError> {
    let Some(value) = value else {
        return Ok(());
    };
    if allowed.contains(&value) || (allow_none && value == NONE_OPTION) {
        return Ok(());
    }
    Err(TagError::InvalidTags(format!(
        "{} '{}' is not one of {:?}",
        field, value, allowed
    )))
}

/// Check every known attribute of `tags` against the vocabulary.
///
/// Extra attributes are not checked.
pub fn validate_tags(tags: &TagSet) -> Result<(), TagError> {
    check("primary_element", tags.primary_element.as_deref(), &ELEMENT_OPTIONS, false)?;
    check("secondary_element", tags.secondary_element.as_deref(), &ELEMENT_OPTIONS, true)?;
    check("primary_principle", tags.primary_principle.as_deref(), &PRINCIPLE_OPTIONS, false)?;
    check("secondary_principle", tags.secondary_principle.as_deref(), &PRINCIPLE_OPTIONS, true)?;
    check("quality", tags.quality.as_deref(), &QUALITY_OPTIONS, false)?;
    for issue in &tags.issues {
        check("issue", Some(issue), &ISSUE_OPTIONS, false)?;
    }
    if tags.notes.len() > MAX_NOTES_LENGTH {
        return Err(TagError::InvalidTags(format!(
            "notes length {} exceeds maximum {} bytes",
            tags.notes.len(),
            MAX_NOTES_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_covers_every_option() {
        for name in ELEMENT_OPTIONS.iter().chain(PRINCIPLE_OPTIONS.iter()) {
            assert!(REFERENCE_TERMS.iter().any(|t| t.name == *name), "{name}");
        }
    }

    #[test]
    fn valid_tags_accepted() {
        let tags = TagSet::new()
            .with_primary("Line", "Balance")
            .with_quality("High")
            .with_issue("blurry");
        assert!(validate_tags(&tags).is_ok());
    }

    #[test]
    fn none_only_allowed_for_secondary() {
        let mut tags = TagSet::new();
        tags.secondary_element = Some(NONE_OPTION.to_string());
        assert!(validate_tags(&tags).is_ok());

        tags.primary_element = Some(NONE_OPTION.to_string());
        assert!(matches!(validate_tags(&tags), Err(TagError::InvalidTags(_))));
    }

    #[test]
    fn unknown_quality_rejected() {
        let tags = TagSet::new().with_quality("Excellent");
        assert!(matches!(validate_tags(&tags), Err(TagError::InvalidTags(_))));
    }

    #[test]
    fn empty_tags_are_valid() {
        assert!(validate_tags(&TagSet::new()).is_ok());
    }
}
