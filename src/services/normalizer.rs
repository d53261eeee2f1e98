//! Text normalization for raw recognizer output
//!
//! Keeps only characters that can be part of a coordinate: ASCII digits,
//! `.`, `,`, `-` and spaces. Any whitespace counts as a separator, runs of
//! separators collapse to one space, and the result is trimmed.

use crate::domain::types::NormalizedText;

#[inline]
fn is_coordinate_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | ',' | '-')
}

/// Reduce raw recognized text to coordinate characters. Never fails.
pub fn normalize(raw: &str) -> NormalizedText {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if is_coordinate_char(c) {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }

    NormalizedText::new(out)
}
