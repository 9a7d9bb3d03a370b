//! The memory bank: aligned keys, labels and ages.
//!
//! Keys live in one row-major buffer, `keys[i * key_dim .. (i + 1) * key_dim]`
//! being slot `i`. Every key is unit length after any mutation.

use rand::Rng;
use serde::Serialize;

use crate::vector::{fill_random_unit, normalize_in_place};

/// Label of a slot that holds no association.
pub const EMPTY_LABEL: i64 = -1;

/// Fixed-capacity store of (key, label, age) slots.
#[derive(Clone, Debug, Serialize)]
pub struct MemoryBank {
    capacity: usize,
    key_dim: usize,
    keys: Vec<f32>,
    values: Vec<i64>,
    ages: Vec<u64>,
}

impl MemoryBank {
    /// Allocate an empty bank with random unit keys.
    pub fn new<R: Rng>(capacity: usize, key_dim: usize, rng: &mut R) -> Self {
        let mut bank = Self {
            capacity,
            key_dim,
            keys: vec![0.0; capacity * key_dim],
            values: vec![EMPTY_LABEL; capacity],
            ages: vec![0; capacity],
        };
        bank.reset(rng);
        bank
    }

    /// Forget every association: labels empty, ages zero, fresh random keys.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        for key in self.keys.chunks_exact_mut(self.key_dim) {
            fill_random_unit(rng, key);
        }
        self.values.fill(EMPTY_LABEL);
        self.ages.fill(0);
    }

    // --- Accessors ---

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn key_dim(&self) -> usize {
        self.key_dim
    }

    /// Flat row-major key matrix.
    pub fn keys(&self) -> &[f32] {
        &self.keys
    }

    pub fn key(&self, slot: usize) -> &[f32] {
        &self.keys[slot * self.key_dim..(slot + 1) * self.key_dim]
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn label(&self, slot: usize) -> i64 {
        self.values[slot]
    }

    pub fn ages(&self) -> &[u64] {
        &self.ages
    }

    pub fn age(&self, slot: usize) -> u64 {
        self.ages[slot]
    }

    /// Number of slots holding a label.
    pub fn occupied(&self) -> usize {
        self.values.iter().filter(|&&v| v != EMPTY_LABEL).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    // --- Slot selection ---

    /// Slot with the greatest age; the lowest index wins ties.
    pub fn oldest_slot(&self) -> usize {
        self.oldest_slot_by(|_, age| age)
    }

    /// Slot with the greatest perturbed age; the lowest index wins ties.
    ///
    /// `effective` receives each slot index and its age.
    pub fn oldest_slot_by<F>(&self, mut effective: F) -> usize
    where
        F: FnMut(usize, u64) -> u64,
    {
        let mut best = 0;
        let mut best_age = 0;
        for (slot, &age) in self.ages.iter().enumerate() {
            let e = effective(slot, age);
            if slot == 0 || e > best_age {
                best = slot;
                best_age = e;
            }
        }
        best
    }

    // --- Mutation ---

    /// Move `slot`'s key toward the unit query and renormalise. The label is
    /// kept. Falls back to the query itself when the two cancel out.
    pub(crate) fn reinforce(&mut self, slot: usize, unit_query: &[f32]) {
        let key_dim = self.key_dim;
        let key = &mut self.keys[slot * key_dim..(slot + 1) * key_dim];
        for (k, &q) in key.iter_mut().zip(unit_query.iter()) {
            *k += q;
        }
        if normalize_in_place(key).is_none() {
            key.copy_from_slice(unit_query);
        }
        self.touch(slot);
    }

    /// Replace `slot` with a new association.
    pub(crate) fn overwrite(&mut self, slot: usize, unit_query: &[f32], label: i64) {
        let key_dim = self.key_dim;
        self.keys[slot * key_dim..(slot + 1) * key_dim].copy_from_slice(unit_query);
        self.values[slot] = label;
        self.touch(slot);
    }

    /// Age every slot by one, except `slot`, which restarts at zero.
    fn touch(&mut self, slot: usize) {
        for age in self.ages.iter_mut() {
            *age = age.saturating_add(1);
        }
        self.ages[slot] = 0;
    }

    #[cfg(test)]
    pub(crate) fn set_ages(&mut self, ages: &[u64]) {
        self.ages.copy_from_slice(ages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{norm, seeded_rng};

    fn bank(capacity: usize, key_dim: usize) -> MemoryBank {
        MemoryBank::new(capacity, key_dim, &mut seeded_rng(0, "test"))
    }

    #[test]
    fn test_new_bank_is_empty() {
        let b = bank(8, 4);
        assert_eq!(b.keys().len(), 32);
        assert_eq!(b.values().len(), 8);
        assert_eq!(b.ages().len(), 8);
        assert!(b.values().iter().all(|&v| v == EMPTY_LABEL));
        assert!(b.ages().iter().all(|&a| a == 0));
        assert!(b.is_empty());
        for slot in 0..8 {
            assert!((norm(b.key(slot)) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_overwrite_resets_age_and_ages_others() {
        let mut b = bank(4, 2);
        b.overwrite(2, &[1.0, 0.0], 7);
        assert_eq!(b.label(2), 7);
        assert_eq!(b.key(2), &[1.0, 0.0]);
        assert_eq!(b.ages(), &[1, 1, 0, 1]);
        assert_eq!(b.occupied(), 1);
    }

    #[test]
    fn test_reinforce_moves_key_toward_query() {
        let mut b = bank(2, 2);
        b.overwrite(0, &[1.0, 0.0], 3);
        b.reinforce(0, &[0.0, 1.0]);
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((b.key(0)[0] - h).abs() < 1e-6);
        assert!((b.key(0)[1] - h).abs() < 1e-6);
        assert_eq!(b.label(0), 3);
        assert_eq!(b.ages(), &[0, 2]);
    }

    #[test]
    fn test_reinforce_opposite_query_takes_query() {
        let mut b = bank(2, 2);
        b.overwrite(0, &[1.0, 0.0], 3);
        b.reinforce(0, &[-1.0, 0.0]);
        assert_eq!(b.key(0), &[-1.0, 0.0]);
    }

    #[test]
    fn test_oldest_slot_lowest_index_on_ties() {
        let mut b = bank(5, 2);
        assert_eq!(b.oldest_slot(), 0);
        b.set_ages(&[1, 4, 2, 4, 0]);
        assert_eq!(b.oldest_slot(), 1);
    }

    #[test]
    fn test_oldest_slot_by_perturbation() {
        let mut b = bank(3, 2);
        b.set_ages(&[5, 3, 1]);
        let slot = b.oldest_slot_by(|slot, age| if slot == 2 { age + 10 } else { age });
        assert_eq!(slot, 2);
    }

    #[test]
    fn test_reset_clears_associations() {
        let mut rng = seeded_rng(0, "test");
        let mut b = MemoryBank::new(4, 2, &mut rng);
        b.overwrite(1, &[0.0, 1.0], 9);
        b.reset(&mut rng);
        assert!(b.values().iter().all(|&v| v == EMPTY_LABEL));
        assert!(b.ages().iter().all(|&a| a == 0));
    }
}
