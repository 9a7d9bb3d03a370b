//! Margin loss over retrieved neighbours, with its gradient.
//!
//! For a unit query `q̂ = q / ‖q‖` with label `y`:
//!
//! ```text
//! loss = max(0, margin - s_pos + s_neg)
//! ```
//!
//! - `s_pos` is the similarity of the best-ranked neighbour labelled `y`. When
//!   none was retrieved, `s_pos = 1`: the similarity of `q̂` to the slot the
//!   write policy fills with `q̂` itself. That term is constant.
//! - `s_neg` is the similarity of the best-ranked neighbour with a different,
//!   non-empty label. Without one there is nothing to separate from and the
//!   loss is 0.
//!
//! Keys are treated as constants. Only the similarities of the selected
//! slots carry gradient, which is pulled back through the normalisation of
//! the raw embedding.

use serde::{Deserialize, Serialize};

use super::bank::{MemoryBank, EMPTY_LABEL};
use crate::similarity::Scored;
use crate::vector::dot;

/// Scalar loss for one query and its gradient with respect to the raw
/// (unnormalised) query embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Loss {
    pub value: f32,
    pub grad: Vec<f32>,
    /// Slot used for the positive term, if one was retrieved.
    pub positive: Option<usize>,
    /// Slot used for the negative term, if one was retrieved.
    pub negative: Option<usize>,
}

impl Loss {
    /// Evaluate the loss against the current bank.
    ///
    /// `unit_query` is the normalised embedding, `query_norm` the norm it was
    /// divided by.
    pub fn compute(
        bank: &MemoryBank,
        neighbors: &[Scored],
        unit_query: &[f32],
        query_norm: f32,
        label: i64,
        margin: f32,
    ) -> Self {
        let positive = neighbors.iter().find(|n| bank.label(n.slot) == label);
        let negative = neighbors.iter().find(|n| {
            let l = bank.label(n.slot);
            l != label && l != EMPTY_LABEL
        });

        let mut grad = vec![0.0; unit_query.len()];
        let Some(negative) = negative else {
            return Self {
                value: 0.0,
                grad,
                positive: positive.map(|p| p.slot),
                negative: None,
            };
        };

        let s_pos = positive.map_or(1.0, |p| p.similarity);
        let value = (margin - s_pos + negative.similarity).max(0.0);

        if value > 0.0 {
            // d loss / d q̂
            for (g, &k) in grad.iter_mut().zip(bank.key(negative.slot)) {
                *g = k;
            }
            if let Some(p) = positive {
                for (g, &k) in grad.iter_mut().zip(bank.key(p.slot)) {
                    *g -= k;
                }
            }
            // Pull back through q̂ = q / ‖q‖.
            let radial = dot(&grad, unit_query);
            for (g, &u) in grad.iter_mut().zip(unit_query) {
                *g = (*g - radial * u) / query_norm;
            }
        }

        Self {
            value,
            grad,
            positive: positive.map(|p| p.slot),
            negative: Some(negative.slot),
        }
    }
}

/// Softmax over neighbour similarities scaled by `inverse_temperature`.
pub fn attention(neighbors: &[Scored], inverse_temperature: f32) -> Vec<f32> {
    let Some(max) = neighbors
        .iter()
        .map(|n| n.similarity * inverse_temperature)
        .reduce(f32::max)
    else {
        return Vec::new();
    };
    let exps: Vec<f32> = neighbors
        .iter()
        .map(|n| (n.similarity * inverse_temperature - max).exp())
        .collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::Similarity;
    use crate::vector::{normalized, seeded_rng};

    fn bank_with(entries: &[([f32; 2], i64)]) -> MemoryBank {
        let mut bank = MemoryBank::new(entries.len() + 1, 2, &mut seeded_rng(0, "keys"));
        for (slot, (key, label)) in entries.iter().enumerate() {
            let (unit, _) = normalized(key).unwrap();
            bank.overwrite(slot, &unit, *label);
        }
        bank
    }

    fn loss_for(bank: &MemoryBank, raw: &[f32], label: i64, margin: f32) -> Loss {
        let (unit, n) = normalized(raw).unwrap();
        let neighbors = Similarity::top_k(bank.keys(), 2, &unit, bank.capacity());
        Loss::compute(bank, &neighbors, &unit, n, label, margin)
    }

    #[test]
    fn test_perfect_match_is_zero() {
        let bank = bank_with(&[([1.0, 0.0], 1), ([0.0, 1.0], 2)]);
        let loss = loss_for(&bank, &[1.0, 0.0], 1, 0.5);
        assert_eq!(loss.value, 0.0);
        assert!(loss.grad.iter().all(|&g| g == 0.0));
        assert_eq!(loss.positive, Some(0));
        assert_eq!(loss.negative, Some(1));
    }

    #[test]
    fn test_hinge_active() {
        let bank = bank_with(&[([1.0, 0.0], 1), ([0.8, 0.6], 2)]);
        let loss = loss_for(&bank, &[0.8, 0.6], 1, 0.5);
        // s_pos = 0.8, s_neg = 1.0
        assert!((loss.value - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_no_positive_falls_back_to_one() {
        let bank = bank_with(&[([1.0, 0.0], 2)]);
        let loss = loss_for(&bank, &[0.6, 0.8], 1, 0.5);
        // s_pos = 1, s_neg = 0.6
        assert!((loss.value - 0.1).abs() < 1e-5);
        assert_eq!(loss.positive, None);
    }

    #[test]
    fn test_empty_bank_is_zero() {
        let bank = MemoryBank::new(4, 2, &mut seeded_rng(0, "keys"));
        let loss = loss_for(&bank, &[0.3, -0.2], 1, 0.5);
        assert_eq!(loss.value, 0.0);
        assert_eq!(loss.negative, None);
        assert!(loss.value.is_finite());
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let bank = bank_with(&[([1.0, 0.2], 1), ([0.3, 1.0], 2)]);
        let raw = [0.7f32, 0.9];
        let loss = loss_for(&bank, &raw, 1, 0.8);
        assert!(loss.value > 0.0);

        let h = 1e-3f32;
        for i in 0..2 {
            let mut plus = raw;
            let mut minus = raw;
            plus[i] += h;
            minus[i] -= h;
            let numeric = (loss_for(&bank, &plus, 1, 0.8).value
                - loss_for(&bank, &minus, 1, 0.8).value)
                / (2.0 * h);
            assert!(
                (numeric - loss.grad[i]).abs() < 1e-2,
                "dim {}: numeric {} vs analytic {}",
                i,
                numeric,
                loss.grad[i]
            );
        }
    }

    #[test]
    fn test_gradient_orthogonal_to_query() {
        let bank = bank_with(&[([1.0, 0.0], 1), ([0.0, 1.0], 2)]);
        let raw = [0.5f32, 0.5];
        let loss = loss_for(&bank, &raw, 1, 1.0);
        assert!(loss.value > 0.0);
        assert!(dot(&loss.grad, &raw).abs() < 1e-5);
    }

    #[test]
    fn test_attention_sums_to_one() {
        let neighbors = [
            Scored { slot: 0, similarity: 0.9 },
            Scored { slot: 1, similarity: 0.5 },
            Scored { slot: 2, similarity: -0.2 },
        ];
        let w = attention(&neighbors, 40.0);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(w[0] > w[1] && w[1] > w[2]);
        assert!(attention(&[], 40.0).is_empty());
    }
}
