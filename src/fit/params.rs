//! Sampling parameters passed to a sampler.

use crate::error::{JsdmError, Result};
use serde::{Deserialize, Serialize};

/// Draw count, chain count, thinning and burn-in for one fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Retained draws per chain.
    pub samples: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// Keep every `thin`-th draw after burn-in.
    pub thin: usize,
    /// Burn-in iterations discarded before the first retained draw.
    pub transient: usize,
    /// Seed of the first chain; chain `c` uses `seed + c`.
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            samples: 1000,
            chains: 2,
            thin: 1,
            transient: 500,
            seed: 1,
        }
    }
}

impl SamplingParams {
    /// Check the parameters can produce at least one retained draw.
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(JsdmError::Fit("samples must be at least 1".to_string()));
        }
        if self.chains == 0 {
            return Err(JsdmError::Fit("chains must be at least 1".to_string()));
        }
        if self.thin == 0 {
            return Err(JsdmError::Fit("thin must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Iterations each chain runs, burn-in included.
    pub fn iterations_per_chain(&self) -> usize {
        self.transient + self.samples * self.thin
    }

    /// Whether iteration `iter` (0-based) is retained.
    pub fn is_retained(&self, iter: usize) -> bool {
        iter >= self.transient && (iter - self.transient + 1) % self.thin == 0
    }

    /// Total retained draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.samples * self.chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_schedule() {
        let params = SamplingParams {
            samples: 3,
            chains: 1,
            thin: 2,
            transient: 4,
            seed: 0,
        };
        assert_eq!(params.iterations_per_chain(), 10);
        let kept: Vec<usize> = (0..10).filter(|&i| params.is_retained(i)).collect();
        assert_eq!(kept, vec![5, 7, 9]);
    }

    #[test]
    fn test_validate() {
        assert!(SamplingParams::default().validate().is_ok());
        let bad = SamplingParams {
            thin: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(JsdmError::Fit(_))));
    }
}
