// src/core/types.rs
use serde::{Deserialize, Serialize};

/// Index of a node inside the candidate trie arena.
pub type NodeId = usize;

/// Stemmed candidate longform tokens in natural reading order.
pub type TokenTuple = Vec<String>;

/// One extracted longform, rendered in its most frequent observed wording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Longform {
    pub text: String,
    /// Co-occurrence frequency with the shortform.
    pub count: u64,
    /// Scaled (or alignment-blended) score the longform was selected with.
    pub score: f64,
}

/// Upper bound on the number of tokens in an extracted longform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaxLength {
    /// `2 * len(shortform) + 1` tokens.
    #[default]
    Auto,
    Limit(usize),
    Unbounded,
}

impl MaxLength {
    pub fn resolve(self, shortform: &str) -> Option<usize> {
        match self {
            MaxLength::Auto => Some(2 * shortform.chars().count() + 1),
            MaxLength::Limit(n) => Some(n),
            MaxLength::Unbounded => None,
        }
    }
}

/// Which derived passes are current with respect to the trie contents.
///
/// Every mutation drops back to `Dirty`. Extraction first walks the state
/// forward through whichever passes it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Dirty,
    /// Best ancestor/descendant scores are current.
    AncestryPropagated,
    /// Alignment scores are current.
    AlignmentComputed,
    /// Both passes are current.
    Ready,
}

impl PassState {
    pub fn is_propagated(self) -> bool {
        matches!(self, PassState::AncestryPropagated | PassState::Ready)
    }

    pub fn is_aligned(self) -> bool {
        matches!(self, PassState::AlignmentComputed | PassState::Ready)
    }

    pub fn with_propagation(self) -> Self {
        if self.is_aligned() {
            PassState::Ready
        } else {
            PassState::AncestryPropagated
        }
    }

    pub fn with_alignment(self) -> Self {
        if self.is_propagated() {
            PassState::Ready
        } else {
            PassState::AlignmentComputed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_combine_into_ready() {
        let state = PassState::Dirty.with_alignment();
        assert!(state.is_aligned() && !state.is_propagated());
        assert_eq!(state.with_propagation(), PassState::Ready);
        assert_eq!(PassState::Dirty.with_propagation().with_alignment(), PassState::Ready);
    }

    #[test]
    fn auto_length_tracks_shortform() {
        assert_eq!(MaxLength::Auto.resolve("ER"), Some(5));
        assert_eq!(MaxLength::Limit(3).resolve("ER"), Some(3));
        assert_eq!(MaxLength::Unbounded.resolve("ER"), None);
    }
}
