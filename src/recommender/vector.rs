//! Dense vector arithmetic used to build recommendation queries.
//!
//! All functions operate on `f32` slices. Inputs of different lengths are
//! rejected with [`RecommenderError::DimensionMismatch`].

use crate::{RecommenderError, Result};

fn check_same_length(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(RecommenderError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    check_same_length(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length; the zero vector is returned unchanged
#[inline]
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Cosine similarity in `[-1, 1]`, or `0.0` when either side has zero norm
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32> {
    let product = dot(a, b)?;
    let norms = l2_norm(a) * l2_norm(b);
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok((product / norms).clamp(-1.0, 1.0))
}

/// Skills the hackathon asks for that the participant lacks: `normalize(T - P)`
#[inline]
pub fn gap_vector(hackathon: &[f32], participant: &[f32]) -> Result<Vec<f32>> {
    check_same_length(hackathon, participant)?;
    let diff = hackathon
        .iter()
        .zip(participant)
        .map(|(t, p)| t - p)
        .collect();
    Ok(normalize(diff))
}

/// Combined profile of a pair of participants: `normalize(P + Q)`
#[inline]
pub fn team_vector(participant: &[f32], candidate: &[f32]) -> Result<Vec<f32>> {
    check_same_length(participant, candidate)?;
    let sum = participant
        .iter()
        .zip(candidate)
        .map(|(p, q)| p + q)
        .collect();
    Ok(normalize(sum))
}
