// src/core/mod.rs

pub mod engine;
pub mod extractor;
pub mod trie;
pub mod types;
