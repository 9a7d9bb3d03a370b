//! Memory configuration.
//!
//! All parameters are fixed when a [`Memory`](crate::Memory) is constructed.
//! Defaults follow the Omniglot setup the module was designed around:
//! 8192 slots of 128-dimensional keys, 256 neighbours, margin 0.1.
//!
//! ```rust
//! use episodic_memory::MemoryConfig;
//!
//! let config = MemoryConfig::from_json(r#"{"capacity": 64, "key_dim": 16, "top_k": 4}"#).unwrap();
//! assert_eq!(config.capacity, 64);
//! assert_eq!(config.margin, 0.1); // default
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// Construction-time parameters of an episodic memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of slots in the bank.
    pub capacity: usize,
    /// Dimensionality of keys and query embeddings.
    pub key_dim: usize,
    /// Neighbours retrieved per query.
    pub top_k: usize,
    /// Hinge margin between same-label and different-label similarity.
    pub margin: f32,
    /// Softmax sharpness applied to neighbour similarities.
    pub inverse_temperature: f32,
    /// Upper bound of the random integer added to each age when picking the
    /// slot to evict. 0 disables the noise.
    pub age_noise: u64,
    /// Root seed for reset keys and the age-noise stream.
    pub seed: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 8192,
            key_dim: 128,
            top_k: 256,
            margin: 0.1,
            inverse_temperature: 40.0,
            age_noise: 0,
            seed: 0,
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with the given shape and default hyperparameters.
    ///
    /// `top_k` is clamped to `capacity` so small banks stay valid.
    pub fn new(capacity: usize, key_dim: usize) -> Self {
        let defaults = Self::default();
        Self {
            capacity,
            key_dim,
            top_k: defaults.top_k.min(capacity.max(1)),
            ..defaults
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_inverse_temperature(mut self, inverse_temperature: f32) -> Self {
        self.inverse_temperature = inverse_temperature;
        self
    }

    pub fn with_age_noise(mut self, age_noise: u64) -> Self {
        self.age_noise = age_noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parse a configuration from JSON and validate it.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a usable memory.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(MemoryError::InvalidConfig("capacity must be positive".into()));
        }
        if self.key_dim == 0 {
            return Err(MemoryError::InvalidConfig("key_dim must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(MemoryError::InvalidConfig("top_k must be positive".into()));
        }
        if self.top_k > self.capacity {
            return Err(MemoryError::InvalidConfig(format!(
                "top_k ({}) exceeds capacity ({})",
                self.top_k, self.capacity
            )));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "margin must be finite and non-negative, got {}",
                self.margin
            )));
        }
        if !self.inverse_temperature.is_finite() || self.inverse_temperature <= 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "inverse_temperature must be finite and positive, got {}",
                self.inverse_temperature
            )));
        }
        Ok(())
    }
}
