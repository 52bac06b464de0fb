//! JSON configuration for one or more checkpoint chains.
//!
//! A config names the row dimension and a list of half-sketch sizes; each
//! size yields one chain, so a single stream can be replayed against several
//! ranks at once.
//!
//! ```rust
//! use attp::ChainConfig;
//!
//! let cfg = ChainConfig::from_json(r#"{"dimension": 8, "half_sketch_sizes": [4, 16]}"#)?;
//! assert_eq!(cfg.num_configs(), 2);
//! let chains = cfg.build_all()?;
//! assert_eq!(chains[1].rank(), 16);
//! # Ok::<(), attp::AttpError>(())
//! ```

use crate::error::{AttpError, Result};
use crate::kernel::PowerIteration;
use crate::memory::CheckpointChain;
use serde::{Deserialize, Serialize};

/// Parameters for building [`CheckpointChain`]s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Row dimension `d`.
    pub dimension: usize,
    /// One chain per entry; each entry is the rank `l`.
    pub half_sketch_sizes: Vec<usize>,
    /// Iteration cap for the eviction test's power iteration.
    pub power_iterations: usize,
    /// Relative convergence tolerance for the same.
    pub power_tolerance: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let power = PowerIteration::default();
        Self {
            dimension: 0,
            half_sketch_sizes: vec![8],
            power_iterations: power.max_iters,
            power_tolerance: power.tolerance,
        }
    }
}

impl ChainConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(AttpError::InvalidParameter(
                "dimension must be positive".into(),
            ));
        }
        if self.half_sketch_sizes.is_empty() {
            return Err(AttpError::InvalidParameter(
                "half_sketch_sizes must list at least one size".into(),
            ));
        }
        if let Some(pos) = self.half_sketch_sizes.iter().position(|&l| l == 0) {
            return Err(AttpError::InvalidParameter(format!(
                "half_sketch_sizes[{}] must be positive",
                pos
            )));
        }
        if self.power_iterations == 0 {
            return Err(AttpError::InvalidParameter(
                "power_iterations must be positive".into(),
            ));
        }
        if !(self.power_tolerance >= 0.0) {
            return Err(AttpError::InvalidParameter(format!(
                "power_tolerance must be >= 0, got {}",
                self.power_tolerance
            )));
        }
        Ok(())
    }

    pub fn num_configs(&self) -> usize {
        self.half_sketch_sizes.len()
    }

    pub fn power(&self) -> PowerIteration {
        PowerIteration {
            max_iters: self.power_iterations,
            tolerance: self.power_tolerance,
        }
    }

    /// Build the chain for `half_sketch_sizes[idx]`.
    pub fn build(&self, idx: usize) -> Result<CheckpointChain> {
        self.validate()?;
        let l = *self.half_sketch_sizes.get(idx).ok_or_else(|| {
            AttpError::InvalidParameter(format!(
                "config index {} out of range ({} configs)",
                idx,
                self.num_configs()
            ))
        })?;
        CheckpointChain::with_power(l, self.dimension, self.power())
    }

    pub fn build_all(&self) -> Result<Vec<CheckpointChain>> {
        (0..self.num_configs()).map(|i| self.build(i)).collect()
    }
}
