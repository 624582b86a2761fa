// File: src/stemmer.rs
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ENGLISH: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

/// Snowball English stemmer that remembers which surface words were mapped
/// to each stem, so stemmed longforms can be rendered back in the wording
/// that was actually observed most often.
///
/// Serializes as `{"counts": {stem: {word: count}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchfulStemmer {
    counts: BTreeMap<String, BTreeMap<String, u64>>,
}

impl WatchfulStemmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a stemmer from previously dumped counts.
    pub fn from_counts(counts: BTreeMap<String, BTreeMap<String, u64>>) -> Self {
        Self { counts }
    }

    /// Stems a word and records the observation.
    pub fn stem(&mut self, word: &str) -> String {
        let stem = ENGLISH.stem(&word.to_lowercase()).into_owned();
        *self
            .counts
            .entry(stem.clone())
            .or_default()
            .entry(word.to_string())
            .or_insert(0) += 1;
        stem
    }

    /// Most frequently observed surface word for `stem`. Ties go to the
    /// lexicographically smallest word; unseen stems are returned as-is.
    pub fn most_frequent(&self, stem: &str) -> String {
        let Some(words) = self.counts.get(stem) else {
            return stem.to_string();
        };
        let mut best: Option<(&String, u64)> = None;
        for (word, &count) in words {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((word, count));
            }
        }
        best.map(|(w, _)| w.clone())
            .unwrap_or_else(|| stem.to_string())
    }

    /// Adds another stemmer's counts into this one.
    pub fn merge(&mut self, other: &WatchfulStemmer) {
        for (stem, words) in &other.counts {
            let entry = self.counts.entry(stem.clone()).or_default();
            for (word, count) in words {
                *entry.entry(word.clone()).or_insert(0) += count;
            }
        }
    }

    pub fn counts(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.counts
    }
}
