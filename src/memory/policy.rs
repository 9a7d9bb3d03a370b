//! Write policy: reinforce a confirmed slot or evict the stalest one.
//!
//! The decision only looks at the rank-1 neighbour. If it already carries the
//! query's label the slot is reinforced, otherwise the oldest slot in the whole
//! bank is overwritten. Either way exactly one slot restarts at age zero and
//! every other slot ages by one.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::bank::MemoryBank;
use crate::similarity::Scored;

/// What a training query did to the bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    /// The nearest slot already held the label; its key moved toward the query.
    Reinforce,
    /// The oldest slot was overwritten with the query and its label.
    Evict,
}

/// The slot a training query wrote to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWrite {
    pub slot: usize,
    pub kind: WriteKind,
    /// Label the slot held before the write.
    pub previous_label: i64,
}

/// Eviction tie-breaking: plain oldest-first, or ages perturbed by bounded
/// integer noise.
#[derive(Debug)]
pub struct WritePolicy {
    age_noise: u64,
    rng: ChaCha8Rng,
}

impl WritePolicy {
    pub fn new(age_noise: u64, rng: ChaCha8Rng) -> Self {
        Self { age_noise, rng }
    }

    /// Pick the slot to write for `label` given the ranked neighbours.
    pub fn decide(&mut self, bank: &MemoryBank, neighbors: &[Scored], label: i64) -> SlotWrite {
        if let Some(nearest) = neighbors.first() {
            if bank.label(nearest.slot) == label {
                return SlotWrite {
                    slot: nearest.slot,
                    kind: WriteKind::Reinforce,
                    previous_label: label,
                };
            }
        }
        let slot = self.evict_slot(bank);
        SlotWrite {
            slot,
            kind: WriteKind::Evict,
            previous_label: bank.label(slot),
        }
    }

    /// Carry out a decision on the bank.
    pub fn apply(bank: &mut MemoryBank, write: &SlotWrite, unit_query: &[f32], label: i64) {
        match write.kind {
            WriteKind::Reinforce => bank.reinforce(write.slot, unit_query),
            WriteKind::Evict => bank.overwrite(write.slot, unit_query, label),
        }
    }

    fn evict_slot(&mut self, bank: &MemoryBank) -> usize {
        if self.age_noise == 0 {
            return bank.oldest_slot();
        }
        let noise = self.age_noise;
        let rng = &mut self.rng;
        bank.oldest_slot_by(|_, age| age.saturating_add(rng.gen_range(0..=noise)))
    }
}
