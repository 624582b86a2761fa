// File: src/alignment.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Score assigned to alignments that cannot be completed.
pub const IMPOSSIBLE: f64 = -1e20;

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "during", "each",
    "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "may", "more", "most", "no", "not", "of", "on", "or", "other", "our",
    "over", "she", "should", "so", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "through", "to", "under", "up", "upon",
    "using", "via", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "will", "with", "within", "without", "would",
];

/// Per-path alignment state threaded from a trie node to its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentState {
    /// Normalized alignment score in `[0, 1]`, consumed by extraction.
    pub alignment_score: f64,
    /// Longform tokens seen along the path, in reading order.
    pub encoded_tokens: Vec<String>,
    /// Prize earned by each token in `encoded_tokens` for starting with a
    /// shortform character.
    pub word_prizes: Vec<f64>,
    pub best_ancestor_align_score: f64,
    /// `best_char_scores[i]`: best raw score aligning the shortform suffix
    /// starting at character `i` into the path's tokens.
    pub best_char_scores: Vec<f64>,
    /// Raw score of the path when no shortform character is placed in it.
    pub sum_ancestor_word_scores: f64,
    pub stop_count: u32,
}

impl AlignmentState {
    /// Seed state held by the trie root.
    pub fn root(shortform_len: usize) -> Self {
        Self {
            alignment_score: 0.0,
            encoded_tokens: Vec::new(),
            word_prizes: Vec::new(),
            best_ancestor_align_score: 0.0,
            best_char_scores: vec![IMPOSSIBLE; shortform_len],
            sum_ancestor_word_scores: 0.0,
            stop_count: 0,
        }
    }
}

/// Transition contract used by the trie's alignment pass: given the parent's
/// state and the token that extends the candidate one word further from the
/// shortform, produce the child's state. Must be pure.
pub trait AlignmentScorer {
    fn next_state(&self, parent: &AlignmentState, token: &str) -> AlignmentState;
}

/// Aligns shortform characters, in order, as subsequences of the longform's
/// words. Characters that begin a word earn `word_start_prize` on top of
/// their unit score; content words absorbing no character cost
/// `unused_word_penalty`. Stop words are free to skip.
#[derive(Debug, Clone)]
pub struct AlignmentBasedScorer {
    shortform: Vec<char>,
    stop_words: HashSet<String>,
    word_start_prize: f64,
    unused_word_penalty: f64,
}

impl AlignmentBasedScorer {
    pub fn new(shortform: &str) -> Self {
        Self {
            shortform: shortform.to_lowercase().chars().collect(),
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            word_start_prize: 1.0,
            unused_word_penalty: 1.0,
        }
    }

    pub fn with_stop_words<I, S>(mut self, stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words = stop_words.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_word_start_prize(mut self, prize: f64) -> Self {
        self.word_start_prize = prize;
        self
    }

    pub fn with_unused_word_penalty(mut self, penalty: f64) -> Self {
        self.unused_word_penalty = penalty;
        self
    }

    fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    /// Raw score of placing `part` inside `word`, or `IMPOSSIBLE` when `part`
    /// is not a subsequence of it.
    fn place(&self, word: &[char], part: &[char]) -> f64 {
        let mut chars = word.iter();
        for c in part {
            if !chars.any(|w| w == c) {
                return IMPOSSIBLE;
            }
        }
        let prize = match (word.first(), part.first()) {
            (Some(w), Some(p)) if w == p => self.word_start_prize,
            _ => 0.0,
        };
        part.len() as f64 + prize
    }

    fn best_possible(&self) -> f64 {
        self.shortform.len() as f64 * (1.0 + self.word_start_prize)
    }
}

impl AlignmentScorer for AlignmentBasedScorer {
    fn next_state(&self, parent: &AlignmentState, token: &str) -> AlignmentState {
        let m = self.shortform.len();
        let word: Vec<char> = token.to_lowercase().chars().collect();
        let stop = self.is_stop_word(token);
        let unused = if stop { 0.0 } else { -self.unused_word_penalty };

        let suffix_score = |j: usize| {
            if j < m {
                parent.best_char_scores.get(j).copied().unwrap_or(IMPOSSIBLE)
            } else {
                parent.sum_ancestor_word_scores
            }
        };

        let mut best_char_scores = Vec::with_capacity(m);
        for i in 0..m {
            let mut best = unused + suffix_score(i);
            for j in (i + 1)..=m {
                let rest = suffix_score(j);
                if rest <= IMPOSSIBLE / 2.0 {
                    continue;
                }
                let placed = self.place(&word, &self.shortform[i..j]);
                if placed > IMPOSSIBLE / 2.0 {
                    best = best.max(placed + rest);
                }
            }
            best_char_scores.push(best.max(IMPOSSIBLE));
        }

        let alignment_score = match best_char_scores.first() {
            Some(&raw) if raw > 0.0 && self.best_possible() > 0.0 => {
                (raw / self.best_possible()).min(1.0)
            }
            _ => 0.0,
        };

        let prize = match word.first() {
            Some(c) if self.shortform.contains(c) => self.word_start_prize,
            _ => 0.0,
        };
        let mut encoded_tokens = Vec::with_capacity(parent.encoded_tokens.len() + 1);
        encoded_tokens.push(token.to_string());
        encoded_tokens.extend(parent.encoded_tokens.iter().cloned());
        let mut word_prizes = Vec::with_capacity(parent.word_prizes.len() + 1);
        word_prizes.push(prize);
        word_prizes.extend(parent.word_prizes.iter().copied());

        AlignmentState {
            alignment_score,
            encoded_tokens,
            word_prizes,
            best_ancestor_align_score: parent
                .best_ancestor_align_score
                .max(parent.alignment_score),
            best_char_scores,
            sum_ancestor_word_scores: parent.sum_ancestor_word_scores + unused,
            stop_count: parent.stop_count + u32::from(stop),
        }
    }
}
