//! Invariants of the incremental statistic, merging and extraction

mod common;

use acromine_core::{
    compose, AcromineMiner, AlignmentBasedScorer, ExtractionParams, MinerError, TrieNode,
};
use common::{close, er_windows, miner_from, tokens};
use proptest::prelude::*;

const VOCABULARY: &[&str] = &["alpha", "beta", "gamma", "delta", "kappa"];

fn window_strategy() -> impl Strategy<Value = Vec<Vec<&'static str>>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(VOCABULARY), 1..5),
        1..40,
    )
}

fn assert_same_statistics(left: &AcromineMiner, right: &AcromineMiner) {
    assert_eq!(left.trie().len(), right.trie().len());
    for id in left.trie().bfs_order().into_iter().skip(1) {
        let expected = left.trie().node(id);
        let found = right
            .trie()
            .find(&expected.longform)
            .map(|other| right.trie().node(other))
            .unwrap_or_else(|| panic!("missing {:?}", expected.longform));
        assert_eq!(expected.count, found.count, "{:?}", expected.longform);
        assert!(close(expected.sum_ft, found.sum_ft));
        assert!(close(expected.sum_ft2, found.sum_ft2));
        assert!(
            (expected.score - found.score).abs() < 1e-6,
            "{:?}: {} vs {}",
            expected.longform,
            expected.score,
            found.score
        );
    }
    assert_eq!(left.longform_scores().len(), right.longform_scores().len());
    for (key, &score) in left.longform_scores() {
        let other = right.longform_scores().get(key).copied();
        assert!(
            other.is_some_and(|other| (other - score).abs() < 1e-6),
            "{key:?}: {score} vs {other:?}"
        );
    }
}

proptest! {
    #[test]
    fn incremental_statistics_match_a_recount(windows in window_strategy()) {
        let miner = miner_from(&windows);
        prop_assert_eq!(miner.trie().find_inconsistent(1e-6), None);
    }

    #[test]
    fn flat_map_tracks_node_scores(windows in window_strategy()) {
        let miner = miner_from(&windows);
        prop_assert_eq!(miner.longform_scores().len(), miner.trie().len());
        for id in miner.trie().bfs_order().into_iter().skip(1) {
            let node = miner.trie().node(id);
            let recorded = miner.longform_scores().get(&node.natural_longform()).copied();
            prop_assert_eq!(recorded, Some(node.score));
        }
    }

    #[test]
    fn merging_equals_training_on_the_union(
        windows in window_strategy(),
        split in 0usize..40,
    ) {
        let split = split.min(windows.len());
        let whole = miner_from(&windows);
        let mut left = miner_from(&windows[..split]);
        let right = miner_from(&windows[split..]);
        left.update(&right).unwrap();
        assert_same_statistics(&whole, &left);
        prop_assert_eq!(left.trie().find_inconsistent(1e-6), None);
    }

    #[test]
    fn extracted_candidates_beat_their_ancestors(windows in window_strategy()) {
        let mut miner = miner_from(&windows);
        miner.propagate_scores();
        let trie = miner.trie();
        let maxima = trie.local_maxima(|node| node.scaled_score(4.0));
        let chosen: Vec<_> = maxima.iter().map(|&(id, _)| id).collect();
        for &(id, value) in &maxima {
            let mut ancestor = trie.node(id).parent();
            while let Some(a) = ancestor.filter(|&a| !trie.node(a).is_root()) {
                prop_assert!(value > trie.node(a).scaled_score(4.0));
                prop_assert!(!chosen.contains(&a));
                ancestor = trie.node(a).parent();
            }
        }
    }

    #[test]
    fn blended_candidates_beat_their_ancestors(windows in window_strategy()) {
        let mut miner = miner_from(&windows);
        miner.propagate_scores();
        miner.compute_alignment_scores(&AlignmentBasedScorer::new("ER"));
        let trie = miner.trie();
        let value = |node: &TrieNode| node.blended_score(4.0, 0.001);
        let maxima = trie.local_maxima(value);
        prop_assert!(!maxima.is_empty());
        let chosen: Vec<_> = maxima.iter().map(|&(id, _)| id).collect();
        for &(id, blended) in &maxima {
            prop_assert_eq!(blended, value(trie.node(id)));
            let mut ancestor = trie.node(id).parent();
            while let Some(a) = ancestor.filter(|&a| !trie.node(a).is_root()) {
                prop_assert!(blended > value(trie.node(a)));
                prop_assert!(!chosen.contains(&a));
                ancestor = trie.node(a).parent();
            }
        }

        // default extraction returns exactly these once the cutoff is lifted
        let params = ExtractionParams::default().with_cutoff(f64::NEG_INFINITY);
        let extracted = miner.get_longforms(&params);
        prop_assert_eq!(extracted.len(), chosen.len());
    }

    #[test]
    fn raising_the_cutoff_only_removes_longforms(windows in window_strategy()) {
        let mut miner = miner_from(&windows);
        let loose = miner.get_longforms(&ExtractionParams::default().with_cutoff(-1.0));
        let strict = miner.get_longforms(&ExtractionParams::default().with_cutoff(0.5));
        for longform in &strict {
            prop_assert!(longform.score > 0.5);
            prop_assert!(loose.iter().any(|l| l.text == longform.text));
        }
    }
}

#[test]
fn split_corpus_composes_to_the_same_longforms() {
    let windows = er_windows();
    let (even, odd): (Vec<_>, Vec<_>) = windows
        .iter()
        .cloned()
        .enumerate()
        .partition(|(i, _)| i % 2 == 0);
    let even: Vec<_> = even.into_iter().map(|(_, w)| w).collect();
    let odd: Vec<_> = odd.into_iter().map(|(_, w)| w).collect();

    let mut whole = miner_from(&windows);
    let parts = [miner_from(&even), miner_from(&odd)];
    let mut composed = compose(&parts).unwrap();
    assert_same_statistics(&whole, &composed);

    for params in [ExtractionParams::acromine_only(), ExtractionParams::default()] {
        let expected = whole.get_longforms(&params);
        let found = composed.get_longforms(&params);
        assert_eq!(expected.len(), found.len());
        for (a, b) in expected.iter().zip(&found) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.count, b.count);
            assert!((a.score - b.score).abs() < 1e-9);
        }
    }
    // inputs are left untouched
    assert_eq!(parts[0].trie().len(), miner_from(&even).trie().len());
}

#[test]
fn compose_rejects_empty_and_mismatched_inputs() {
    assert!(matches!(compose(&[]), Err(MinerError::EmptyComposition)));
    let er = AcromineMiner::new("ER").unwrap();
    let ir = AcromineMiner::new("IR").unwrap();
    assert!(matches!(
        compose(&[er, ir]),
        Err(MinerError::ConfigurationMismatch { .. })
    ));
}

#[test]
fn pruning_keeps_shallow_statistics() {
    let mut miner = miner_from(&er_windows());
    let before = miner.trie().clone();
    miner.prune(2);

    for id in miner.trie().bfs_order().into_iter().skip(1) {
        let node = miner.trie().node(id);
        assert!(node.longform.len() <= 2);
        let original = before.node(before.find(&node.longform).unwrap());
        assert_eq!(node.count, original.count);
        assert_eq!(node.score, original.score);
    }
    assert!(miner.trie().find(&tokens(&["reticulum", "endoplasm"])).is_some());
    assert!(miner
        .trie()
        .find(&tokens(&["reticulum", "endoplasm", "the"]))
        .is_none());
    assert!(miner.longform_scores().keys().all(|k| k.len() <= 2));

    let longforms = miner.get_longforms(&ExtractionParams::acromine_only().with_cutoff(-1.0));
    assert!(longforms.iter().all(|l| l.text.split(' ').count() <= 2));
}
