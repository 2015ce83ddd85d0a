//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target number of rows per emitted batch. This is the engine's sole
    /// batching/backpressure knob; peak memory scales with it.
    pub block_size: usize,

    /// Execution parallelism across segments. The driver must respect this
    /// when launching segment tasks. `0` means available CPU parallelism.
    pub max_parallel_tasks: usize,

    /// The block cache sweeps expired weak entries every this many accesses
    /// (amortized cleanup rather than per-access).
    pub cache_sweep_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_parallel_tasks: 0,
            cache_sweep_interval: 256,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `QUARRY_BLOCK_SIZE`: rows per batch
    /// - `QUARRY_MAX_PARALLEL_TASKS`: segment parallelism (0 = all cores)
    /// - `QUARRY_CACHE_SWEEP_INTERVAL`: cache sweep period in accesses
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("QUARRY_BLOCK_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.block_size = v;
            }
        }

        if let Ok(s) = std::env::var("QUARRY_MAX_PARALLEL_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_tasks = v;
            }
        }

        if let Ok(s) = std::env::var("QUARRY_CACHE_SWEEP_INTERVAL") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.cache_sweep_interval = v;
            }
        }

        cfg
    }

    /// Validate tunables that have hard floors.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.block_size == 0 {
            return Err(crate::error::Error::Config(
                "block_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.block_size > 0);
    }

    #[test]
    fn zero_block_size_rejected() {
        let cfg = EngineConfig {
            block_size: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
