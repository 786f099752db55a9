use thiserror::Error;

use crate::embed::Embedding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimilarityError {
    #[error("vector has zero norm")]
    ZeroNorm,
    #[error("vector contains NaN or infinite components")]
    NonFinite,
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine of the angle between `a` and `b`, clamped to [-1, 1].
///
/// Zero-norm input is an error rather than NaN so callers can drop the
/// candidate instead of ranking it.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || !dot.is_finite() {
        return Err(SimilarityError::NonFinite);
    }
    if denom == 0.0 {
        return Err(SimilarityError::ZeroNorm);
    }
    Ok((dot / denom).clamp(-1.0, 1.0))
}

/// Component-wise arithmetic mean. `None` for an empty input.
pub fn mean_vector(vectors: &[&[f32]]) -> Result<Option<Embedding>, SimilarityError> {
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let dims = first.len();
    let mut sum = vec![0.0f64; dims];
    for v in vectors {
        if v.len() != dims {
            return Err(SimilarityError::DimensionMismatch {
                left: dims,
                right: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += f64::from(*x);
        }
    }
    let n = vectors.len() as f64;
    Ok(Some(sum.into_iter().map(|s| (s / n) as f32).collect()))
}
