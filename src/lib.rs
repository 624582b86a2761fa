// src/lib.rs

//! Online discovery of abbreviation longforms with the Acromine algorithm.
//!
//! Text windows preceding each defining pattern `longform (SF)` are stemmed
//! and fed, nearest token first, into a candidate trie whose nodes keep the
//! Acromine likelihood up to date in constant time per observation. Queries
//! propagate scores along each path and pick the local maxima, optionally
//! blending in a character-alignment score against the shortform.
//!
//! ```no_run
//! use acromine_core::{AcromineMiner, ExtractionParams};
//!
//! let mut miner = AcromineMiner::new("ER").unwrap();
//! miner.process_texts(["Stress in the endoplasmic reticulum (ER) activates the UPR."]);
//! for longform in miner.get_longforms(&ExtractionParams::default()) {
//!     println!("{} {} {:.3}", longform.text, longform.count, longform.score);
//! }
//! ```

pub mod alignment;
pub mod config;
pub mod core;
pub mod error;
pub mod persistence;
pub mod stemmer;

pub use crate::alignment::{AlignmentBasedScorer, AlignmentScorer, AlignmentState};
pub use crate::config::{ExtractionParams, MinerConfig};
pub use crate::core::engine::{compose, AcromineMiner};
pub use crate::core::extractor::{CandidateExtractor, DefiningPatternExtractor};
pub use crate::core::trie::{CandidateTrie, TrieNode};
pub use crate::core::types::{Longform, MaxLength, PassState, TokenTuple};
pub use crate::error::{MinerError, Result};
pub use crate::stemmer::WatchfulStemmer;
