use crate::alignment::{AlignmentBasedScorer, AlignmentScorer};
use crate::config::{ExtractionParams, MinerConfig};
use crate::core::extractor::{CandidateExtractor, DefiningPatternExtractor};
use crate::core::trie::CandidateTrie;
use crate::core::types::{Longform, PassState, TokenTuple};
use crate::error::{MinerError, Result};
use crate::stemmer::WatchfulStemmer;
use std::collections::HashMap;
use tracing::{debug, info};

/// Finds candidate longforms for a shortform in a text corpus with the
/// Acromine algorithm (Okazaki and Ananiadou, 2006).
///
/// Training is online: texts can be processed at any time, and miners
/// trained on disjoint shards can be combined with [`AcromineMiner::update`]
/// or [`compose`].
#[derive(Debug, Clone)]
pub struct AcromineMiner {
    pub(crate) shortform: String,
    pub(crate) window: usize,
    pub(crate) trie: CandidateTrie,
    /// Latest score of every candidate observed so far, keyed by stemmed
    /// tokens in reading order.
    pub(crate) longforms: HashMap<TokenTuple, f64>,
    pub(crate) stemmer: WatchfulStemmer,
    pub(crate) state: PassState,
}

impl AcromineMiner {
    pub fn new(shortform: &str) -> Result<Self> {
        Self::with_config(shortform, MinerConfig::default())
    }

    pub fn with_config(shortform: &str, config: MinerConfig) -> Result<Self> {
        if shortform.is_empty() {
            return Err(MinerError::InvalidConfig(
                "shortform must not be empty".to_string(),
            ));
        }
        config.validate()?;
        Ok(Self {
            shortform: shortform.to_string(),
            window: config.window,
            trie: CandidateTrie::new(shortform.chars().count()),
            longforms: HashMap::new(),
            stemmer: WatchfulStemmer::new(),
            state: PassState::Dirty,
        })
    }

    pub fn shortform(&self) -> &str {
        &self.shortform
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn trie(&self) -> &CandidateTrie {
        &self.trie
    }

    pub fn stemmer(&self) -> &WatchfulStemmer {
        &self.stemmer
    }

    pub fn longform_scores(&self) -> &HashMap<TokenTuple, f64> {
        &self.longforms
    }

    pub fn pass_state(&self) -> PassState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// Updates candidate statistics from texts, looking for longforms before
    /// each parenthesized occurrence of the shortform.
    pub fn process_texts<I, S>(&mut self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extractor = DefiningPatternExtractor::for_shortform(&self.shortform);
        self.process_texts_with(texts, &extractor);
    }

    pub fn process_texts_with<I, S, E>(&mut self, texts: I, extractor: &E)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: CandidateExtractor + ?Sized,
    {
        let (mut text_count, mut window_count) = (0usize, 0usize);
        for text in texts {
            text_count += 1;
            for tokens in extractor.extract(text.as_ref(), &self.shortform, self.window) {
                if !tokens.is_empty() {
                    self.add_window(tokens.as_slice());
                    window_count += 1;
                }
            }
        }
        self.state = PassState::Dirty;
        debug!(
            shortform = %self.shortform,
            texts = text_count,
            windows = window_count,
            candidates = self.trie.len(),
            "processed texts"
        );
    }

    /// Adds one candidate window, tokens in reading order, to the trie.
    pub fn add_window<T: AsRef<str>>(&mut self, tokens: &[T]) {
        let mut stems: Vec<String> = tokens
            .iter()
            .map(|token| self.stemmer.stem(token.as_ref()))
            .collect();
        stems.reverse();
        let path = self.trie.observe(&stems);
        for id in path {
            let node = self.trie.node(id);
            self.longforms.insert(node.natural_longform(), node.score);
        }
        self.state = PassState::Dirty;
    }

    /// Top scoring candidates by raw likelihood, without propagation.
    ///
    /// Sorted by descending score, then shortest first, then
    /// lexicographically. A `limit` beyond the number of candidates returns
    /// them all.
    pub fn top(&self, limit: Option<usize>) -> Vec<(String, f64)> {
        let mut candidates: Vec<(&TokenTuple, f64)> =
            self.longforms.iter().map(|(k, &v)| (k, v)).collect();
        candidates.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(a.0.len().cmp(&b.0.len()))
                .then_with(|| a.0.cmp(b.0))
        });
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        candidates
            .into_iter()
            .map(|(tokens, score)| (self.make_readable(tokens), score))
            .collect()
    }

    /// Computes best ancestor and descendant scores across the trie.
    pub fn propagate_scores(&mut self) {
        self.trie.propagate_scores();
        self.state = self.state.with_propagation();
        debug!(nodes = self.trie.len(), "propagated scores");
    }

    /// Computes alignment scores for every candidate with `scorer`.
    pub fn compute_alignment_scores<S: AlignmentScorer + ?Sized>(&mut self, scorer: &S) {
        self.trie.compute_alignment(scorer);
        self.state = self.state.with_alignment();
        debug!(nodes = self.trie.len(), "computed alignment scores");
    }

    /// Extracts longforms that are local maxima of the (optionally
    /// alignment-blended) scaled score along their trie path.
    ///
    /// Runs whichever derived passes are stale first. Results are sorted by
    /// descending count, then descending score, then text.
    pub fn get_longforms(&mut self, params: &ExtractionParams) -> Vec<Longform> {
        if !self.state.is_propagated() {
            self.propagate_scores();
        }
        if params.use_alignment && !self.state.is_aligned() {
            let scorer = AlignmentBasedScorer::new(&self.shortform);
            self.compute_alignment_scores(&scorer);
        }
        let smoothing = params.smoothing_param;
        let decay = params.alignment_decay;
        let maxima = if params.use_alignment {
            self.trie.local_maxima(|node| node.blended_score(smoothing, decay))
        } else {
            self.trie.local_maxima(|node| node.scaled_score(smoothing))
        };

        let max_length = params.max_length.resolve(&self.shortform);
        let mut longforms: Vec<Longform> = maxima
            .into_iter()
            .filter(|&(_, score)| score > params.cutoff)
            .map(|(id, score)| (self.trie.node(id), score))
            .filter(|(node, _)| max_length.map_or(true, |max| node.longform.len() <= max))
            .map(|(node, score)| Longform {
                text: self.make_readable(&node.natural_longform()),
                count: node.count,
                score,
            })
            .collect();
        longforms.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.score.total_cmp(&a.score))
                .then_with(|| a.text.cmp(&b.text))
        });
        longforms
    }

    /// Discards every candidate longer than `max_depth` tokens.
    pub fn prune(&mut self, max_depth: usize) {
        let removed = self.trie.prune(max_depth);
        for tokens in &removed {
            self.longforms.remove(tokens);
        }
        self.state = PassState::Dirty;
        info!(max_depth, removed = removed.len(), "pruned candidate trie");
    }

    /// Adds the statistics of a miner trained on a disjoint corpus, as if
    /// its texts had been processed here.
    pub fn update(&mut self, other: &AcromineMiner) -> Result<()> {
        if other.shortform != self.shortform {
            return Err(MinerError::ConfigurationMismatch {
                expected: self.shortform.clone(),
                found: other.shortform.clone(),
            });
        }
        self.stemmer.merge(&other.stemmer);
        for (tokens, &score) in &other.longforms {
            self.longforms.entry(tokens.clone()).or_insert(score);
        }
        let touched = self.trie.merge_from(&other.trie);
        for &id in &touched {
            let node = self.trie.node(id);
            self.longforms.insert(node.natural_longform(), node.score);
        }
        self.state = PassState::Dirty;
        info!(
            shortform = %self.shortform,
            touched = touched.len(),
            candidates = self.trie.len(),
            "merged miner"
        );
        Ok(())
    }

    /// Renders stemmed tokens, in reading order, with the most frequent
    /// wording observed for each stem.
    pub fn make_readable(&self, tokens: &[String]) -> String {
        tokens
            .iter()
            .map(|stem| self.stemmer.most_frequent(stem))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Combines miners trained on disjoint corpora into a new miner. The inputs
/// are left untouched.
pub fn compose(miners: &[AcromineMiner]) -> Result<AcromineMiner> {
    let (first, rest) = miners.split_first().ok_or(MinerError::EmptyComposition)?;
    if let Some(mismatch) = rest.iter().find(|m| m.shortform != first.shortform) {
        return Err(MinerError::ConfigurationMismatch {
            expected: first.shortform.clone(),
            found: mismatch.shortform.clone(),
        });
    }
    let mut output = first.clone();
    for miner in rest {
        output.update(miner)?;
    }
    Ok(output)
}
