//! int8 quantization of L2-normalized embedding vectors (spec.md §4.6),
//! grounded on `generate-embeddings-v2.py`'s
//! `np.clip(embs_f32 * 127, -127, 127).astype(np.int8)`.

/// Saturating-map an L2-normalized float vector to int8 by `×127`, clipped
/// to `[-127, 127]`.
pub fn quantize(embedding: &[f32]) -> Vec<i8> {
    embedding
        .iter()
        .map(|v| (v * 127.0).clamp(-127.0, 127.0) as i8)
        .collect()
}

/// Quantize and serialize as little-endian raw bytes of length D, ready for
/// the BLOB and vec0 KNN tables.
pub fn quantize_to_bytes(embedding: &[f32]) -> Vec<u8> {
    quantize(embedding).into_iter().map(|b| b.to_le_bytes()[0]).collect()
}

/// Inverse of [`quantize_to_bytes`], used by the validation pass to recover
/// approximate floats for brute-force cosine comparison.
pub fn dequantize_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| (b as i8) as f32 / 127.0).collect()
}
