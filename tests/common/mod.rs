//! Shared corpus builders for integration tests

#![allow(dead_code)]

use acromine_core::AcromineMiner;

pub const ENDOPLASMIC_CONTEXT: &[&str] = &[
    "the", "rough", "smooth", "in", "of", "from", "within", "swollen", "stressed", "to",
];

pub const SARCOPLASMIC_CONTEXT: &[&str] = &["cardiac", "skeletal", "muscle"];

pub const RETICULUM_CONTEXT: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "kappa", "sigma", "omega", "zeta", "iota", "theta",
    "lambda", "upsilon", "phi", "chi", "psi", "tau", "rho", "mu", "nu", "xi",
];

/// Candidate windows for "ER": "endoplasmic reticulum" 50 times behind ten
/// different words, "sarcoplasmic reticulum" 3 times, and "reticulum" alone
/// behind twenty different words once each.
pub fn er_windows() -> Vec<Vec<&'static str>> {
    let mut windows = Vec::new();
    for i in 0..50 {
        windows.push(vec![
            ENDOPLASMIC_CONTEXT[i % ENDOPLASMIC_CONTEXT.len()],
            "endoplasmic",
            "reticulum",
        ]);
    }
    for word in SARCOPLASMIC_CONTEXT {
        windows.push(vec![*word, "sarcoplasmic", "reticulum"]);
    }
    for word in RETICULUM_CONTEXT {
        windows.push(vec![*word, "reticulum"]);
    }
    windows
}

pub fn miner_from(windows: &[Vec<&str>]) -> AcromineMiner {
    let mut miner = AcromineMiner::new("ER").unwrap();
    for window in windows {
        miner.add_window(window.as_slice());
    }
    miner
}

pub fn tokens(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
}
