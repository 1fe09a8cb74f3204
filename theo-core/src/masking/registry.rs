//! Bidirectional placeholder ↔ original-value mapping for one turn.
//!
//! The registry is the reversibility primitive of the pipeline. It lives only
//! inside the trust boundary: it is not `Serialize`, and its
//! `Debug` output never prints original values.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::category::Category;

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// Tested by test_token_pattern_compiles().
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[A-Z][A-Z0-9_]*_[0-9]+\]")
        .expect("BUG: TOKEN_PATTERN regex is invalid, this is a programmer error")
});

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Refused to register an empty (or whitespace-only) value.
    #[error("cannot register an empty value for category {category}")]
    EmptyValue {
        /// Category of the rejected registration
        category: Category,
    },
}

#[derive(Clone)]
struct Entry {
    category: Category,
    original: String,
}

/// Mapping from placeholder token (e.g. `[PERSON_1]`) to original text.
///
/// Counters are per category and start at 1 for every new registry, so each
/// question restarts numbering.
#[derive(Clone, Default)]
pub struct PlaceholderRegistry {
    entries: HashMap<String, Entry>,
    by_value: HashMap<(Category, String), String>,
    counters: HashMap<Category, u32>,
    reserved: HashSet<String>,
    order: Vec<String>,
}

/// Result of [`PlaceholderRegistry::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    /// Text with every registered token replaced by its original value.
    pub text: String,
    /// Token-shaped strings that were left in place because the registry has
    /// no entry for them, in order of first appearance.
    pub unbound: Vec<String>,
}

impl PlaceholderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that will never mint a token already present
    /// literally in `text`.
    ///
    /// Used with the raw query so that user text resembling a placeholder can
    /// not be confused with one during restoration.
    #[must_use]
    pub fn reserving_tokens_in(text: &str) -> Self {
        let mut registry = Self::default();
        registry.reserved = TOKEN_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        registry
    }

    /// Register `original` under `category` and return its token.
    ///
    /// Registering the same value in the same category again returns the
    /// existing token instead of minting a new one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyValue`] if `original` is blank.
    pub fn register(
        &mut self,
        category: Category,
        original: impl Into<String>,
    ) -> Result<String, RegistryError> {
        let original = original.into();
        if original.trim().is_empty() {
            return Err(RegistryError::EmptyValue { category });
        }

        let key = (category, original);
        if let Some(token) = self.by_value.get(&key) {
            return Ok(token.clone());
        }
        let (category, original) = key;

        let counter = self.counters.entry(category.clone()).or_insert(0);
        let token = loop {
            *counter += 1;
            let candidate = format!("[{}_{}]", category.as_str(), counter);
            if !self.reserved.contains(&candidate) {
                break candidate;
            }
        };

        self.entries.insert(
            token.clone(),
            Entry {
                category: category.clone(),
                original: original.clone(),
            },
        );
        self.by_value.insert((category, original), token.clone());
        self.order.push(token.clone());
        Ok(token)
    }

    /// Look up the token already assigned to `original` in `category`.
    #[must_use]
    pub fn token_for(&self, category: &Category, original: &str) -> Option<&str> {
        self.by_value
            .get(&(category.clone(), original.to_string()))
            .map(String::as_str)
    }

    /// Look up the original value behind `token`.
    #[must_use]
    pub fn original(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(|e| e.original.as_str())
    }

    /// Category of a registered token.
    #[must_use]
    pub fn category(&self, token: &str) -> Option<&Category> {
        self.entries.get(token).map(|e| &e.category)
    }

    /// Registered tokens in the order they were minted.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every registered token in `text` with its original value.
    ///
    /// Single left-to-right scan: substituted values are never rescanned, so
    /// an original that itself looks like a token is emitted verbatim.
    #[must_use]
    pub fn restore(&self, text: &str) -> Restored {
        let mut out = String::with_capacity(text.len());
        let mut unbound: Vec<String> = Vec::new();
        let mut last = 0;

        for m in TOKEN_PATTERN.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            match self.entries.get(m.as_str()) {
                Some(entry) => out.push_str(&entry.original),
                None => {
                    out.push_str(m.as_str());
                    if !unbound.iter().any(|t| t == m.as_str()) {
                        unbound.push(m.as_str().to_string());
                    }
                }
            }
            last = m.end();
        }
        out.push_str(&text[last..]);

        Restored { text: out, unbound }
    }

    /// Registered original values that occur verbatim in `text`.
    ///
    /// Returns tokens, not values, so callers can log the result.
    #[must_use]
    pub fn leaked_tokens(&self, text: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|token| {
                self.entries
                    .get(token.as_str())
                    .is_some_and(|e| text.contains(e.original.as_str()))
            })
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Debug for PlaceholderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderRegistry")
            .field("tokens", &self.order)
            .field("values", &"[REDACTED]")
            .finish()
    }
}

/// All token-shaped substrings of `text`, in order of appearance.
pub fn find_tokens(text: &str) -> impl Iterator<Item = &str> {
    TOKEN_PATTERN.find_iter(text).map(|m| m.as_str())
}
