//! Episodic memory: recall, write policy and margin loss over one bank.
//!
//! A [`Memory`] owns a [`MemoryBank`] of `capacity` unit-length keys with
//! integer labels and ages. Each call to [`Memory::query`]:
//!
//! 1. normalises the embeddings and retrieves the top-k most similar slots;
//! 2. predicts the label of the nearest slot;
//! 3. scores the margin [`Loss`] against the retrieved neighbours;
//! 4. in [`QueryMode::Train`], reinforces or evicts exactly one slot.
//!
//! Call [`Memory::reset`] at the start of every episode so associations never
//! leak between tasks.
//!
//! # Example
//!
//! ```rust
//! use episodic_memory::{Memory, MemoryConfig, QueryMode, EMPTY_LABEL};
//!
//! let mut memory = Memory::new(MemoryConfig::new(4, 2).with_top_k(1).with_margin(0.5)).unwrap();
//! memory.reset();
//!
//! // Nothing stored yet: the nearest slot is empty.
//! let first = memory.query_one(&[1.0, 0.0], Some(1), QueryMode::Train).unwrap();
//! assert_eq!(first.prediction, EMPTY_LABEL);
//!
//! // The same embedding now recalls its label.
//! let second = memory.query_one(&[1.0, 0.0], Some(1), QueryMode::Train).unwrap();
//! assert_eq!(second.prediction, 1);
//! assert_eq!(second.loss.unwrap().value, 0.0);
//! ```

pub mod bank;
pub mod loss;
pub mod policy;

pub use bank::{MemoryBank, EMPTY_LABEL};
pub use loss::Loss;
pub use policy::{SlotWrite, WriteKind, WritePolicy};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::similarity::{Scored, Similarity};
use crate::vector::{normalized, seeded_rng};

/// Whether a query may write to the bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Read, score, then reinforce or evict one slot per query. Labels required.
    Train,
    /// Read and score only; the bank is left untouched. Labels optional.
    Predict,
}

impl QueryMode {
    pub fn writes(self) -> bool {
        matches!(self, QueryMode::Train)
    }
}

/// A retrieved slot as it stood when the query read it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub slot: usize,
    pub similarity: f32,
    pub label: i64,
}

/// Outcome of one query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Label of the nearest slot; [`EMPTY_LABEL`] if that slot is empty.
    pub prediction: i64,
    /// Top-k neighbours, best first.
    pub neighbors: Vec<Neighbor>,
    /// Softmax over neighbour similarities, aligned with `neighbors`.
    pub attention: Vec<f32>,
    /// Present whenever a label was supplied.
    pub loss: Option<Loss>,
    /// Present in [`QueryMode::Train`].
    pub write: Option<SlotWrite>,
}

/// Outcomes of a batch, in input order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBatch {
    pub results: Vec<QueryResult>,
}

impl QueryBatch {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryResult> {
        self.results.iter()
    }

    pub fn predictions(&self) -> Vec<i64> {
        self.results.iter().map(|r| r.prediction).collect()
    }

    /// Sum of per-query losses.
    pub fn total_loss(&self) -> f32 {
        self.results
            .iter()
            .filter_map(|r| r.loss.as_ref())
            .map(|l| l.value)
            .sum()
    }

    /// Mean loss over the queries that carry one.
    pub fn mean_loss(&self) -> Option<f32> {
        let count = self.results.iter().filter(|r| r.loss.is_some()).count();
        if count == 0 {
            return None;
        }
        Some(self.total_loss() / count as f32)
    }

    /// Per-query gradients with respect to the raw embeddings.
    pub fn grads(&self) -> Vec<Option<&[f32]>> {
        self.results
            .iter()
            .map(|r| r.loss.as_ref().map(|l| l.grad.as_slice()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a QueryBatch {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Differentiable episodic memory for few-shot classification.
///
/// Exclusively owned by one training or evaluation loop; every operation that
/// changes the bank takes `&mut self`.
#[derive(Debug)]
pub struct Memory {
    config: MemoryConfig,
    bank: MemoryBank,
    policy: WritePolicy,
}

impl Memory {
    /// Validate `config` and build an empty memory.
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let bank = MemoryBank::new(
            config.capacity,
            config.key_dim,
            &mut seeded_rng(config.seed, "keys"),
        );
        let policy = WritePolicy::new(config.age_noise, seeded_rng(config.seed, "age_noise"));
        debug!(
            capacity = config.capacity,
            key_dim = config.key_dim,
            top_k = config.top_k,
            "episodic memory created"
        );
        Ok(Self {
            config,
            bank,
            policy,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Read-only view of the bank.
    pub fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    /// Return to the empty state: every label empty, every age zero, random
    /// keys. Two consecutive resets leave identical banks.
    pub fn reset(&mut self) {
        self.bank.reset(&mut seeded_rng(self.config.seed, "keys"));
        self.policy = WritePolicy::new(
            self.config.age_noise,
            seeded_rng(self.config.seed, "age_noise"),
        );
        debug!(capacity = self.config.capacity, "episodic memory reset");
    }

    /// Alias of [`reset`](Self::reset).
    pub fn build(&mut self) {
        self.reset();
    }

    /// Query a single embedding.
    pub fn query_one(
        &mut self,
        embedding: &[f32],
        label: Option<i64>,
        mode: QueryMode,
    ) -> Result<QueryResult> {
        if mode.writes() && label.is_none() {
            return Err(MemoryError::MissingLabels);
        }
        if let Some(label) = label {
            check_label(label)?;
        }
        let (unit, norm) = self.prepare(embedding, 0)?;
        let neighbors = Similarity::top_k(
            self.bank.keys(),
            self.config.key_dim,
            &unit,
            self.config.top_k,
        );
        Ok(self.step(&unit, norm, label, neighbors, mode))
    }

    /// Query a batch of embeddings.
    ///
    /// The whole batch is validated before anything is read or written; a
    /// shape error leaves the bank untouched. In [`QueryMode::Train`] writes
    /// are applied in batch order and each query sees the writes of the ones
    /// before it, exactly as if they had been issued one at a time.
    pub fn query(
        &mut self,
        embeddings: &[Vec<f32>],
        labels: Option<&[i64]>,
        mode: QueryMode,
    ) -> Result<QueryBatch> {
        match labels {
            Some(labels) => {
                if labels.len() != embeddings.len() {
                    return Err(MemoryError::LabelCountMismatch {
                        expected: embeddings.len(),
                        got: labels.len(),
                    });
                }
                labels.iter().try_for_each(|&l| check_label(l))?;
            }
            None if mode.writes() => return Err(MemoryError::MissingLabels),
            None => {}
        }

        let (units, norms): (Vec<Vec<f32>>, Vec<f32>) = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| self.prepare(e, i))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        if units.is_empty() {
            return Ok(QueryBatch::default());
        }

        let top_k = self.config.top_k;
        let key_dim = self.config.key_dim;

        // Read ahead for the whole batch. Each query may have to skip up to one
        // slot per earlier write, so search deeper than top_k when writing.
        let depth = if mode.writes() {
            (top_k + units.len() - 1).min(self.config.capacity)
        } else {
            top_k
        };
        let candidates = Similarity::top_k_batch(self.bank.keys(), key_dim, &units, depth);

        let mut touched: Vec<usize> = Vec::new();
        let mut results = Vec::with_capacity(units.len());
        for (i, ((unit, &norm), ahead)) in units.iter().zip(&norms).zip(candidates).enumerate() {
            let neighbors = if touched.is_empty() {
                let mut ahead = ahead;
                ahead.truncate(top_k);
                ahead
            } else {
                Similarity::refresh(&ahead, &touched, self.bank.keys(), key_dim, unit, top_k)
            };
            let label = labels.map(|l| l[i]);
            let result = self.step(unit, norm, label, neighbors, mode);
            if let Some(write) = &result.write {
                if !touched.contains(&write.slot) {
                    touched.push(write.slot);
                }
            }
            results.push(result);
        }

        Ok(QueryBatch { results })
    }

    /// Predict, score, and (in training mode) write for one prepared query.
    fn step(
        &mut self,
        unit: &[f32],
        norm: f32,
        label: Option<i64>,
        neighbors: Vec<Scored>,
        mode: QueryMode,
    ) -> QueryResult {
        let prediction = neighbors
            .first()
            .map_or(EMPTY_LABEL, |n| self.bank.label(n.slot));
        let attention = loss::attention(&neighbors, self.config.inverse_temperature);
        let loss = label.map(|y| {
            Loss::compute(&self.bank, &neighbors, unit, norm, y, self.config.margin)
        });
        let records = neighbors
            .iter()
            .map(|n| Neighbor {
                slot: n.slot,
                similarity: n.similarity,
                label: self.bank.label(n.slot),
            })
            .collect();

        let write = match (mode, label) {
            (QueryMode::Train, Some(y)) => {
                let write = self.policy.decide(&self.bank, &neighbors, y);
                WritePolicy::apply(&mut self.bank, &write, unit, y);
                trace!(
                    slot = write.slot,
                    kind = ?write.kind,
                    label = y,
                    previous_label = write.previous_label,
                    "memory write"
                );
                Some(write)
            }
            _ => None,
        };

        QueryResult {
            prediction,
            neighbors: records,
            attention,
            loss,
            write,
        }
    }

    fn prepare(&self, embedding: &[f32], index: usize) -> Result<(Vec<f32>, f32)> {
        if embedding.len() != self.config.key_dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.config.key_dim,
                got: embedding.len(),
            });
        }
        normalized(embedding).ok_or(MemoryError::DegenerateQuery { index })
    }
}

fn check_label(label: i64) -> Result<()> {
    if label < 0 {
        return Err(MemoryError::InvalidLabel(label));
    }
    Ok(())
}
