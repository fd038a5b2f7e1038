use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use waypoint_core::types::Coordinates;

use crate::error::GeoError;
use crate::table::{normalize, GeoBiasTable, GeoCityEntry};

/// How a token was matched against the bias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The whole token equals an alias.
    ExactAlias,
    /// The token contains an alias as a whole-word run.
    Containment,
}

/// A resolved coordinate hint for a place token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoBias {
    pub token: String,
    pub matched_alias: String,
    pub kind: MatchKind,
    pub canonical_name: String,
    pub country: String,
    pub coordinates: Coordinates,
}

impl GeoBias {
    fn from_entry(token: &str, alias: &str, kind: MatchKind, entry: &GeoCityEntry) -> Self {
        Self {
            token: token.to_string(),
            matched_alias: alias.to_string(),
            kind,
            canonical_name: entry.canonical_name.clone(),
            country: entry.country.clone(),
            coordinates: entry.coordinates,
        }
    }
}

/// Result of a bias lookup. `Unresolved` never carries a guessed coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeoResolution {
    Resolved(GeoBias),
    Unresolved { token: String },
}

impl GeoResolution {
    pub fn bias(&self) -> Option<&GeoBias> {
        match self {
            GeoResolution::Resolved(bias) => Some(bias),
            GeoResolution::Unresolved { .. } => None,
        }
    }
}

/// A known alias found inside a longer utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoAnnotation {
    /// Index of the first matched word in the normalized utterance.
    pub word_offset: usize,
    pub bias: GeoBias,
}

/// Disambiguates place tokens against a [`GeoBiasTable`].
#[derive(Debug, Clone)]
pub struct GeoBiasResolver {
    table: Arc<GeoBiasTable>,
}

impl GeoBiasResolver {
    pub fn new(table: Arc<GeoBiasTable>) -> Self {
        Self { table }
    }

    /// Resolver over the built-in table.
    pub fn builtin() -> Self {
        Self::new(GeoBiasTable::builtin())
    }

    pub fn table(&self) -> &GeoBiasTable {
        &self.table
    }

    /// Resolve a place token.
    ///
    /// Order: exact alias, then the longest alias contained in the token
    /// (ties go to the entry listed first), then unresolved.
    pub fn resolve(&self, token: &str) -> GeoResolution {
        let normalized = normalize(token);
        if normalized.is_empty() {
            return GeoResolution::Unresolved {
                token: token.to_string(),
            };
        }

        if let Some(entry) = self.table.exact(&normalized) {
            debug!(token, alias = %normalized, "Exact bias alias match");
            return GeoResolution::Resolved(GeoBias::from_entry(
                token,
                &normalized,
                MatchKind::ExactAlias,
                entry,
            ));
        }

        let padded = format!(" {} ", normalized);
        let best = self
            .table
            .aliases()
            .filter(|(alias, _)| padded.contains(&format!(" {} ", alias)))
            .min_by(|(a_alias, a_idx), (b_alias, b_idx)| {
                b_alias
                    .len()
                    .cmp(&a_alias.len())
                    .then_with(|| a_idx.cmp(b_idx))
                    .then_with(|| a_alias.cmp(b_alias))
            });

        match best {
            Some((alias, idx)) => {
                debug!(token, alias, "Containment bias alias match");
                GeoResolution::Resolved(GeoBias::from_entry(
                    token,
                    alias,
                    MatchKind::Containment,
                    self.table.entry(idx),
                ))
            }
            None => {
                debug!(token, "Place token not in bias table");
                GeoResolution::Unresolved {
                    token: token.to_string(),
                }
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but reports a miss as [`GeoError::Unresolved`].
    pub fn resolve_strict(&self, token: &str) -> Result<GeoBias, GeoError> {
        match self.resolve(token) {
            GeoResolution::Resolved(bias) => Ok(bias),
            GeoResolution::Unresolved { token } => Err(GeoError::Unresolved(token)),
        }
    }

    /// Find every known alias mentioned in free text.
    ///
    /// Longer aliases win over shorter ones they overlap ("eiffel tower"
    /// over a hypothetical "tower"). Results are in utterance order.
    pub fn annotate(&self, text: &str) -> Vec<GeoAnnotation> {
        let normalized = normalize(text);
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
        if words.is_empty() {
            return Vec::new();
        }

        // (start word, word count, alias, entry index)
        let mut candidates: Vec<(usize, usize, &str, usize)> = Vec::new();
        for (alias, idx) in self.table.aliases() {
            let alias_words: Vec<&str> = alias.split(' ').collect();
            if alias_words.len() > words.len() {
                continue;
            }
            for start in 0..=(words.len() - alias_words.len()) {
                if words[start..start + alias_words.len()] == alias_words[..] {
                    candidates.push((start, alias_words.len(), alias, idx));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.2.len()
                .cmp(&a.2.len())
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.3.cmp(&b.3))
        });

        let mut taken = vec![false; words.len()];
        let mut annotations = Vec::new();
        for (start, count, alias, idx) in candidates {
            if taken[start..start + count].iter().any(|t| *t) {
                continue;
            }
            taken[start..start + count].iter_mut().for_each(|t| *t = true);
            let token = words[start..start + count].join(" ");
            annotations.push(GeoAnnotation {
                word_offset: start,
                bias: GeoBias::from_entry(
                    &token,
                    alias,
                    MatchKind::ExactAlias,
                    self.table.entry(idx),
                ),
            });
        }

        annotations.sort_by_key(|a| a.word_offset);
        annotations
    }
}

// =============================================================================
// Tests
// =============================================================================
