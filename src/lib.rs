//! # Episodic Memory: recall-based few-shot classification
//!
//! A fixed-capacity memory of unit-length keys and integer labels. Each query
//! embedding retrieves its nearest stored keys, predicts the label of the
//! closest one, yields a margin loss (with its gradient) for training the
//! upstream embedding network, and then writes itself into the bank: either
//! reinforcing the slot that already recalled the right label, or evicting
//! the stalest slot.
//!
//! ## Quick Start
//!
//! ```rust
//! use episodic_memory::{Memory, MemoryConfig, QueryMode};
//!
//! let config = MemoryConfig::new(64, 4).with_top_k(4);
//! let mut memory = Memory::new(config)?;
//!
//! // One episode: reset, then stream (embedding, label) pairs.
//! memory.reset();
//! let shots = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
//! memory.query(&shots, Some(&[3, 7]), QueryMode::Train)?;
//!
//! // Evaluation queries read without writing.
//! let out = memory.query(&[vec![2.0, 0.0, 0.0, 0.0]], None, QueryMode::Predict)?;
//! assert_eq!(out.predictions(), vec![3]);
//! # Ok::<(), episodic_memory::MemoryError>(())
//! ```
//!
//! ## Core Concepts
//!
//! - **Slot**: one (key, label, age) triple; the unit of storage and eviction
//! - **Episode**: queries sharing one [`Memory::reset`] lifetime
//! - **Reinforcement**: moving a slot's key toward a query that confirmed it
//! - **Eviction**: overwriting the slot with the greatest age
//!
//! ## Features
//!
//! - `parallel` (default): batch retrieval runs one query per rayon task
//! - `simd`: SIMD dot products via `simsimd`

pub mod config;
pub mod error;
pub mod memory;
pub mod similarity;
pub mod vector;

// Re-exports for convenience
pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use memory::{
    Loss, Memory, MemoryBank, Neighbor, QueryBatch, QueryMode, QueryResult, SlotWrite, WriteKind,
    EMPTY_LABEL,
};
pub use similarity::{Scored, Similarity};
