//! WebSocket frame masking utilities
//!
//! Masking XORs each payload byte `i` with `key[i % 4]`. Applying the same key
//! twice restores the input, so one function serves both directions.

use rand::Rng;

/// Apply a WebSocket mask in place.
///
/// Works four bytes at a time; the key stays aligned because every full chunk
/// starts at a multiple of four.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);

    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

/// Generate a fresh mask key for a client frame.
///
/// `rand::rng()` is a thread-local CSPRNG, so concurrent encoders never share
/// generator state.
#[inline]
pub fn generate_mask() -> [u8; 4] {
    rand::rng().random()
}
