//! Exact top-k cosine search over a flat key matrix.
//!
//! Keys are stored row-major: `keys[i * key_dim .. (i + 1) * key_dim]` is
//! slot `i`. Both keys and queries are expected to be unit length, so cosine
//! similarity is a plain dot product.
//!
//! Ranking is a total order: similarity descending, then slot index
//! ascending. Two searches over the same data always return the same slots in
//! the same order, which keeps training reproducible.
//!
//! With the default `parallel` feature, batch search runs one query per rayon
//! task. The scan inside a query stays sequential.

use std::cmp::Ordering;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use crate::vector::dot;

/// A slot and its similarity to a query.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub slot: usize,
    pub similarity: f32,
}

impl Scored {
    /// Ranking order: higher similarity first, lower slot index on ties.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .similarity
            .total_cmp(&self.similarity)
            .then(self.slot.cmp(&other.slot))
    }
}

/// Exact similarity search.
pub struct Similarity;

impl Similarity {
    /// Similarity of `query` against every slot.
    pub fn scores(keys: &[f32], key_dim: usize, query: &[f32]) -> Vec<f32> {
        assert_eq!(query.len(), key_dim, "Dimension mismatch in scores");
        keys.chunks_exact(key_dim).map(|key| dot(key, query)).collect()
    }

    /// The `k` best slots for `query`, ranked.
    ///
    /// Returns fewer than `k` entries only when the matrix holds fewer slots.
    pub fn top_k(keys: &[f32], key_dim: usize, query: &[f32], k: usize) -> Vec<Scored> {
        let scored: Vec<Scored> = Self::scores(keys, key_dim, query)
            .into_iter()
            .enumerate()
            .map(|(slot, similarity)| Scored { slot, similarity })
            .collect();
        select_top(scored, k)
    }

    /// [`top_k`](Self::top_k) for every query in a batch.
    pub fn top_k_batch(
        keys: &[f32],
        key_dim: usize,
        queries: &[Vec<f32>],
        k: usize,
    ) -> Vec<Vec<Scored>> {
        #[cfg(feature = "parallel")]
        let iter = queries.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = queries.iter();

        iter.map(|q| Self::top_k(keys, key_dim, q, k)).collect()
    }

    /// Bring a candidate list up to date after some slots changed.
    ///
    /// `candidates` must be a ranked top-`d` list computed before the change,
    /// with `d >= k + touched.len()`, and `touched` must list every slot
    /// modified since. Stale entries are dropped, the touched slots are scored
    /// against the current keys, and the merged list is cut to `k`. Under those
    /// conditions the result equals a fresh [`top_k`](Self::top_k).
    pub fn refresh(
        candidates: &[Scored],
        touched: &[usize],
        keys: &[f32],
        key_dim: usize,
        query: &[f32],
        k: usize,
    ) -> Vec<Scored> {
        let mut merged: Vec<Scored> = candidates
            .iter()
            .filter(|c| !touched.contains(&c.slot))
            .copied()
            .collect();
        for &slot in touched {
            let key = &keys[slot * key_dim..(slot + 1) * key_dim];
            merged.push(Scored {
                slot,
                similarity: dot(key, query),
            });
        }
        select_top(merged, k)
    }
}

fn select_top(mut scored: Vec<Scored>, k: usize) -> Vec<Scored> {
    if k == 0 {
        return Vec::new();
    }
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, Scored::rank_cmp);
        scored.truncate(k);
    }
    scored.sort_unstable_by(Scored::rank_cmp);
    scored
}
