//! Dense `f32` vector helpers.
//!
//! Keys and queries are plain slices; everything that compares them assumes
//! unit length, so normalisation lives here next to the dot product.
//!
//! When compiled with the `simd` feature, [`dot`] uses SIMD-accelerated kernels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Norms below this are treated as zero.
pub const NORM_EPSILON: f32 = 1e-12;

/// Inner product of two equal-length slices.
#[cfg(feature = "simd")]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    use simsimd::SpatialSimilarity;
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in dot product");
    f32::dot(a, b).unwrap_or(0.0) as f32
}

#[cfg(not(feature = "simd"))]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in dot product");
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// L2 norm.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place.
///
/// Returns the original norm, or `None` (leaving `v` untouched) when the norm
/// is zero or not finite.
pub fn normalize_in_place(v: &mut [f32]) -> Option<f32> {
    let n = norm(v);
    if !n.is_finite() || n < NORM_EPSILON {
        return None;
    }
    for x in v.iter_mut() {
        *x /= n;
    }
    Some(n)
}

/// Return a unit-length copy of `v` together with the original norm.
pub fn normalized(v: &[f32]) -> Option<(Vec<f32>, f32)> {
    let mut out = v.to_vec();
    let n = normalize_in_place(&mut out)?;
    Some((out, n))
}

/// Deterministic RNG for a named stream under a root seed.
///
/// The stream name is hashed together with the seed so independent streams
/// (reset keys, eviction noise) never share a sequence.
pub fn seeded_rng(seed: u64, stream: &str) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(stream.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[0..8]);
    ChaCha8Rng::seed_from_u64(u64::from_le_bytes(bytes))
}

/// Fill `out` with a random unit vector.
///
/// Components are drawn uniformly from [-1, 1] and normalised; draws that
/// land on (near) zero are retried.
pub fn fill_random_unit<R: Rng>(rng: &mut R, out: &mut [f32]) {
    loop {
        for x in out.iter_mut() {
            *x = rng.gen_range(-1.0f32..=1.0);
        }
        if normalize_in_place(out).is_some() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        assert!((dot(&[1.0, 2.0, 3.0], &[4.0, -5.0, 6.0]) - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_unit_length() {
        let (v, n) = normalized(&[3.0, 4.0]).unwrap();
        assert!((n - 5.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_zero_and_nan() {
        let mut zero = vec![0.0f32; 4];
        assert!(normalize_in_place(&mut zero).is_none());
        assert!(normalized(&[1.0, f32::NAN]).is_none());
        assert!(normalized(&[f32::INFINITY, 0.0]).is_none());
    }

    #[test]
    fn test_seeded_rng_deterministic_per_stream() {
        let a: u64 = seeded_rng(42, "keys").gen();
        let b: u64 = seeded_rng(42, "keys").gen();
        let c: u64 = seeded_rng(42, "age_noise").gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fill_random_unit() {
        let mut rng = seeded_rng(1, "test");
        let mut v = vec![0.0f32; 64];
        fill_random_unit(&mut rng, &mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-5);
    }
}
