// @awa-component: EMB-LocalProvider
//
//! Deterministic offline embeddings (FNV-1a seed, xorshift fill).
//!
//! Selected with `local-<dimensions>` model names. Useful for tests and for
//! running without provider credentials.

pub const DEFAULT_DIMENSIONS: usize = 384;

/// Embed `text` into a vector of `dimensions` values in `[-1, 1]`.
pub fn embed(text: &str, dimensions: usize) -> Vec<f32> {
    let mut seed: u32 = 2_166_136_261;
    for byte in text.bytes() {
        seed ^= byte as u32;
        seed = seed.wrapping_mul(16_777_619);
    }
    // xorshift never leaves zero
    let mut x = if seed == 0 { 1 } else { seed };

    (0..dimensions)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            let normalized = (x as f64) / (u32::MAX as f64);
            (normalized * 2.0 - 1.0) as f32
        })
        .collect()
}
