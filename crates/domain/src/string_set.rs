//! Comma-joined string sets used for product colors and sizes.
//!
//! Catalog records store the available variants of a product as a single
//! text column (`"red,blue"`, `"40,42"`). [`StringSet`] is the parsed form:
//! an insertion-ordered, duplicate-free list of tokens that all satisfy a
//! [`TokenRule`]. It is parsed once at write time and serialized back to the
//! same comma-joined text for storage.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::ValidationError;

/// Comma-joined word characters in any script.
static WORD_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+,)*\w+$").expect("Invalid regex"));

/// Comma-joined runs of Arabic letters (U+0621 to U+064A).
static ARABIC_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\x{0621}-\x{064A}]+,)*[\x{0621}-\x{064A}]+$").expect("Invalid regex")
});

/// Comma-joined ASCII numbers.
static DIGIT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+,)*[0-9]+$").expect("Invalid regex"));

/// Character class every token of a set must consist of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRule {
    /// Letters, digits or underscore in any script.
    Word,
    /// Arabic letters.
    Arabic,
    /// ASCII digits.
    Digits,
}

impl TokenRule {
    /// Pattern the whole comma-joined text must match.
    fn pattern(self) -> &'static Regex {
        match self {
            TokenRule::Word => &WORD_LIST_RE,
            TokenRule::Arabic => &ARABIC_LIST_RE,
            TokenRule::Digits => &DIGIT_LIST_RE,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            TokenRule::Word => "letters, digits or underscores",
            TokenRule::Arabic => "Arabic letters",
            TokenRule::Digits => "digits",
        }
    }
}

/// An ordered set of validated tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringSet {
    items: Vec<String>,
}

impl StringSet {
    /// Parses comma-joined text, validating every token against `rule`.
    ///
    /// The text must contain at least one token and no empty entries, so
    /// `""`, `"red,"` and `"red,,blue"` are all rejected. Repeated tokens are
    /// kept once, at their first position.
    pub fn parse(field: &'static str, text: &str, rule: TokenRule) -> Result<Self, ValidationError> {
        if !rule.pattern().is_match(text) {
            let reason = if text.split(',').any(str::is_empty) {
                "must be a comma separated list without empty entries".to_string()
            } else {
                format!(
                    "must be a comma separated list, entries may only contain {}",
                    rule.describe()
                )
            };
            return Err(ValidationError::new(field, reason));
        }

        let mut items: Vec<String> = Vec::new();
        for token in text.split(',') {
            if !items.iter().any(|existing| existing == token) {
                items.push(token.to_string());
            }
        }

        Ok(Self { items })
    }

    /// Returns true if `token` is a member of the set.
    pub fn contains(&self, token: &str) -> bool {
        self.items.iter().any(|item| item == token)
    }

    /// Iterates over the tokens in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the set has no tokens.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Comma-joined storage form.
    pub fn to_joined(&self) -> String {
        self.items.join(",")
    }
}

impl std::fmt::Display for StringSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_joined())
    }
}

// Serialized as a JSON array; parsing always goes through `parse` so the
// token rule of the owning field is applied.
impl Serialize for StringSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}
