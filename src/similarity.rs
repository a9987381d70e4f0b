//! Similarity scoring between an upload and a reference, all on a 0-100
//! scale so the fusion policy can blend and threshold them uniformly.

use crate::config::EngineConfig;
use crate::fingerprint::{FINGERPRINT_BITS, ImageFingerprint};

/// Percentage of bit positions two fingerprints agree on.
///
/// Symmetric, and 100 for a fingerprint compared with itself. Lengths are
/// equal by construction (both sides come from the same fixed grid).
pub fn hash_similarity(a: ImageFingerprint, b: ImageFingerprint) -> f64 {
    let matching = FINGERPRINT_BITS - a.distance(b);
    100.0 * f64::from(matching) / f64::from(FINGERPRINT_BITS)
}

/// How close two byte sizes are, as a percentage of the larger one.
///
/// Equal sizes score 100, including two zero-byte inputs, which would
/// otherwise divide by zero.
pub fn size_similarity(a: u64, b: u64) -> f64 {
    if a == b {
        return 100.0;
    }
    let max = a.max(b) as f64;
    let diff = a.abs_diff(b) as f64;
    100.0 * (1.0 - diff / max)
}

/// Weighted blend of fingerprint and size similarity.
///
/// The weights come from [`EngineConfig`]; validation guarantees they are
/// non-negative and sum to 1, so the result stays in 0-100. The clamp only
/// absorbs floating-point dust.
pub fn combined_similarity(hash_score: f64, size_score: f64, config: &EngineConfig) -> f64 {
    (hash_score * config.hash_weight + size_score * config.size_weight).clamp(0.0, 100.0)
}
