// File: src/core/extractor.rs
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::warn;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:['\-]\w+)*").expect("valid regex"));

/// Finds the text windows that may contain a longform for a shortform.
pub trait CandidateExtractor {
    /// Token windows, in reading order, preceding each detected occurrence
    /// of `shortform` in `text`, each drawn from at most `window` characters.
    /// Empty windows are omitted.
    fn extract(&self, text: &str, shortform: &str, window: usize) -> Vec<Vec<String>>;
}

/// Extracts candidates from defining patterns: a parenthesized shortform,
/// as in `endoplasmic reticulum (ER)`.
///
/// Only the tokens after the last punctuation mark inside the window are
/// kept, since a longform never spans one. A word cut in half by the window
/// edge is dropped.
#[derive(Debug, Clone, Default)]
pub struct DefiningPatternExtractor {
    /// Pattern compiled up front for the shortform most calls will ask for.
    compiled: Option<(String, Regex)>,
}

impl DefiningPatternExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor with the pattern for `shortform` compiled once, so mining
    /// a corpus for it does not recompile per text.
    pub fn for_shortform(shortform: &str) -> Self {
        let compiled = Self::compile(shortform).map(|re| (shortform.to_string(), re));
        Self { compiled }
    }

    fn compile(shortform: &str) -> Option<Regex> {
        let pattern = format!(r"\(\s*{}\s*\)", regex::escape(shortform));
        match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(shortform, %err, "could not build defining pattern");
                None
            }
        }
    }

    fn pattern(&self, shortform: &str) -> Option<Cow<'_, Regex>> {
        match &self.compiled {
            Some((cached, re)) if cached == shortform => Some(Cow::Borrowed(re)),
            _ => Self::compile(shortform).map(Cow::Owned),
        }
    }

    fn fragment_before(text: &str, end: usize, window: usize) -> &str {
        if window == 0 {
            return "";
        }
        let head = &text[..end];
        let start = head
            .char_indices()
            .rev()
            .nth(window.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let fragment = &head[start..];
        let cut_mid_word = start > 0
            && head[..start]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric)
            && fragment.chars().next().is_some_and(char::is_alphanumeric);
        if cut_mid_word {
            match fragment.find(|c: char| !c.is_alphanumeric()) {
                Some(i) => &fragment[i..],
                None => "",
            }
        } else {
            fragment
        }
    }

    fn after_last_punctuation(fragment: &str) -> &str {
        let is_break = |c: char| !(c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '\'' || c == '_');
        match fragment.rfind(is_break) {
            Some(i) => {
                let skip = fragment[i..].chars().next().map_or(1, char::len_utf8);
                &fragment[i + skip..]
            }
            None => fragment,
        }
    }

    pub fn tokenize(fragment: &str) -> Vec<String> {
        TOKEN_RE
            .find_iter(fragment)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }
}

impl CandidateExtractor for DefiningPatternExtractor {
    fn extract(&self, text: &str, shortform: &str, window: usize) -> Vec<Vec<String>> {
        let Some(re) = self.pattern(shortform) else {
            return Vec::new();
        };
        re.find_iter(text)
            .map(|m| {
                let fragment = Self::fragment_before(text, m.start(), window);
                Self::tokenize(Self::after_last_punctuation(fragment))
            })
            .filter(|tokens| !tokens.is_empty())
            .collect()
    }
}
