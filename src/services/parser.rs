//! Candidate parsing from normalized text
//!
//! Extracts the first two numeric tokens, applies the configured decimal
//! correction for recognizers that drop the decimal glyph, and builds a
//! candidate with a fixed-precision comparison key.
//!
//! Rejection is expressed as `None`: most ticks miss while the camera is
//! not aligned, so a missing candidate is a normal outcome.

use crate::domain::types::{Candidate, NormalizedText};
use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::trace;

/// Signed number with an optional `.` or `,` separator
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+[.,]?\d*").unwrap());

const DEFAULT_MIN_TOKEN_LEN: usize = 4;
const DEFAULT_KEY_PRECISION: usize = 3;
const DEFAULT_MIN_DIGITS: usize = 4;
const DEFAULT_FIRST_OFFSET: usize = 2;
const DEFAULT_SECOND_OFFSET: usize = 3;
const DEFAULT_DIVISOR: f64 = 10_000.0;

/// How tokens are pulled out of the normalized text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenizer {
    /// Split on whitespace
    #[default]
    Whitespace,
    /// Scan for `[-+]?\d+[.,]?\d*`
    Regex,
}

/// Repair for tokens read without their decimal point.
///
/// Applies only to tokens with no `.` or `,` whose digit count exceeds
/// `min_digits`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecimalCorrection {
    Disabled,
    /// Insert `.` after a fixed number of leading digits, per token slot
    InsertAt {
        #[serde(default = "default_min_digits")]
        min_digits: usize,
        #[serde(default = "default_first_offset")]
        first_offset: usize,
        #[serde(default = "default_second_offset")]
        second_offset: usize,
    },
    /// Divide the parsed integer by a fixed divisor
    DivideBy {
        #[serde(default = "default_min_digits")]
        min_digits: usize,
        #[serde(default = "default_divisor")]
        divisor: f64,
    },
}

fn default_min_digits() -> usize {
    DEFAULT_MIN_DIGITS
}

fn default_first_offset() -> usize {
    DEFAULT_FIRST_OFFSET
}

fn default_second_offset() -> usize {
    DEFAULT_SECOND_OFFSET
}

fn default_divisor() -> f64 {
    DEFAULT_DIVISOR
}

impl Default for DecimalCorrection {
    fn default() -> Self {
        DecimalCorrection::InsertAt {
            min_digits: DEFAULT_MIN_DIGITS,
            first_offset: DEFAULT_FIRST_OFFSET,
            second_offset: DEFAULT_SECOND_OFFSET,
        }
    }
}

/// Parser policy knobs
#[derive(Debug, Clone, PartialEq)]
pub struct ParserSettings {
    /// Shorter tokens are discarded (stray digits from UI chrome)
    pub min_token_len: usize,
    pub tokenizer: Tokenizer,
    pub decimal_correction: DecimalCorrection,
    /// Decimal places in the comparison key
    pub key_precision: usize,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            tokenizer: Tokenizer::default(),
            decimal_correction: DecimalCorrection::default(),
            key_precision: DEFAULT_KEY_PRECISION,
        }
    }
}

/// Position of a token in the pair, before any axis swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    First,
    Second,
}

/// Format a value with fixed precision, folding `-0.000` into `0.000`
fn fixed(value: f64, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => text,
    }
}

/// Canonical comparison key for a coordinate pair
pub fn coordinate_key(lat: f64, lng: f64, precision: usize) -> String {
    format!("{},{}", fixed(lat, precision), fixed(lng, precision))
}

#[inline]
fn has_separator(token: &str) -> bool {
    token.contains(['.', ','])
}

#[inline]
fn digit_count(token: &str) -> usize {
    token.bytes().filter(u8::is_ascii_digit).count()
}

/// Insert a decimal point `offset` digits after the sign.
/// Out-of-range offsets leave the token untouched.
fn insert_decimal(token: &str, offset: usize) -> Cow<'_, str> {
    let (sign, digits) = match token.strip_prefix(['-', '+']) {
        Some(rest) => (&token[..1], rest),
        None => ("", token),
    };
    if offset == 0 || offset >= digits.len() || !digits.is_char_boundary(offset) {
        return Cow::Borrowed(token);
    }
    Cow::Owned(format!("{}{}.{}", sign, &digits[..offset], &digits[offset..]))
}

fn parse_number(token: &str) -> Option<f64> {
    let value: f64 = token.replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

/// Turns normalized text into coordinate candidates
#[derive(Debug, Clone, Default)]
pub struct CandidateParser {
    settings: ParserSettings,
}

impl CandidateParser {
    pub fn new(settings: ParserSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// Parse the first two tokens into a candidate, swapping axes if asked
    pub fn parse(&self, text: &NormalizedText, axis_swap: bool) -> Option<Candidate> {
        let mut tokens = self.tokens(text.as_str());

        let Some(first) = tokens.next() else {
            trace!(text = %text, "parse_no_tokens");
            return None;
        };
        let Some(second) = tokens.next() else {
            trace!(text = %text, "parse_single_token");
            return None;
        };

        let a = self.token_value(first, Slot::First)?;
        let b = self.token_value(second, Slot::Second)?;
        let (lat, lng) = if axis_swap { (b, a) } else { (a, b) };

        Some(Candidate { lat, lng, raw_key: coordinate_key(lat, lng, self.settings.key_precision) })
    }

    fn tokens<'a>(&self, text: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        let min_len = self.settings.min_token_len;
        let raw: Box<dyn Iterator<Item = &'a str> + 'a> = match self.settings.tokenizer {
            // A trailing comma separates list items ("lat, lng"), not decimals
            Tokenizer::Whitespace => {
                Box::new(text.split_whitespace().map(|token| token.trim_end_matches(',')))
            }
            Tokenizer::Regex => Box::new(NUMBER_TOKEN.find_iter(text).map(|m| m.as_str())),
        };
        Box::new(raw.filter(move |token| token.chars().count() >= min_len))
    }

    fn token_value(&self, token: &str, slot: Slot) -> Option<f64> {
        let needs_fix = |min_digits: usize| !has_separator(token) && digit_count(token) > min_digits;

        let value = match self.settings.decimal_correction {
            DecimalCorrection::InsertAt { min_digits, first_offset, second_offset }
                if needs_fix(min_digits) =>
            {
                let offset = match slot {
                    Slot::First => first_offset,
                    Slot::Second => second_offset,
                };
                parse_number(&insert_decimal(token, offset))
            }
            DecimalCorrection::DivideBy { min_digits, divisor }
                if needs_fix(min_digits) && divisor != 0.0 =>
            {
                parse_number(token).map(|v| v / divisor)
            }
            _ => parse_number(token),
        };

        if value.is_none() {
            trace!(token = %token, "parse_token_rejected");
        }
        value
    }
}
