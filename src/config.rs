//! Configuration types for mining and extraction

use crate::core::types::MaxLength;
use crate::error::{MinerError, Result};
use serde::{Deserialize, Serialize};

/// Characters of preceding context considered per defining pattern.
pub const DEFAULT_WINDOW: usize = 100;

/// Miner construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Characters before a defining pattern searched for longform tokens
    pub window: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl MinerConfig {
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(MinerError::InvalidConfig(
                "window must be at least one character".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for longform extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    /// Only longforms scoring strictly above this are returned
    pub cutoff: f64,
    /// Larger values penalize candidates with small counts more
    pub smoothing_param: f64,
    pub max_length: MaxLength,
    /// Blend the scaled score with the alignment score
    pub use_alignment: bool,
    /// Decay of the alignment weight as the chain's best score grows
    pub alignment_decay: f64,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            cutoff: 0.1,
            smoothing_param: 4.0,
            max_length: MaxLength::Auto,
            use_alignment: true,
            alignment_decay: 0.001,
        }
    }
}

impl ExtractionParams {
    /// Pure frequency statistics, no alignment blending
    pub fn acromine_only() -> Self {
        Self {
            use_alignment: false,
            ..Self::default()
        }
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_smoothing(mut self, smoothing_param: f64) -> Self {
        self.smoothing_param = smoothing_param;
        self
    }

    pub fn with_max_length(mut self, max_length: MaxLength) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_alignment(mut self, use_alignment: bool) -> Self {
        self.use_alignment = use_alignment;
        self
    }

    pub fn with_alignment_decay(mut self, alignment_decay: f64) -> Self {
        self.alignment_decay = alignment_decay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = ExtractionParams::default();
        assert_eq!(params.cutoff, 0.1);
        assert_eq!(params.smoothing_param, 4.0);
        assert_eq!(params.max_length, MaxLength::Auto);
        assert!(params.use_alignment);
        assert_eq!(MinerConfig::default().window, 100);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: ExtractionParams = serde_json::from_str(r#"{"cutoff": 0.5}"#).unwrap();
        assert_eq!(params.cutoff, 0.5);
        assert_eq!(params.alignment_decay, 0.001);
        let params: ExtractionParams =
            serde_json::from_str(r#"{"max_length": {"Limit": 3}}"#).unwrap();
        assert_eq!(params.max_length, MaxLength::Limit(3));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(MinerConfig::default().with_window(0).validate().is_err());
    }
}
