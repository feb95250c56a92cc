//! Vector similarity helpers.

/// Smallest norm used as a divisor, so zero vectors score 0 instead of NaN.
pub const NORM_FLOOR: f32 = 1e-12;

/// Dot product over the common prefix of `a` and `b`.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm, floored at [`NORM_FLOOR`].
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt().max(NORM_FLOOR)
}

/// Cosine similarity. Vectors of different lengths are compared over their
/// common prefix for the dot product and over their full length for the norms.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    dot(a, b) / (norm(a) * norm(b))
}
