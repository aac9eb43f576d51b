//! Cosine similarity and exact top-k ranking shared by all backends.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::document::{SearchResult, VectorEntry};

/// Below this many candidates scoring stays on the calling thread.
const PARALLEL_SCORING_THRESHOLD: usize = 1024;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Result order: descending score, then ascending chunk id. NaN scores rank last.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    rank_key(b.score).total_cmp(&rank_key(a.score)).then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Score every candidate against `query` and keep the best `k`.
pub fn rank_exact<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = &'a VectorEntry>,
{
    let candidates: Vec<&VectorEntry> = candidates.into_iter().collect();
    let to_result = |entry: &&VectorEntry| SearchResult {
        chunk_id: entry.chunk_id.clone(),
        text: entry.text.clone(),
        metadata: entry.metadata.clone(),
        score: cosine_similarity(query, &entry.vector),
    };

    let mut scored: Vec<SearchResult> = if candidates.len() >= PARALLEL_SCORING_THRESHOLD {
        candidates.par_iter().map(to_result).collect()
    } else {
        candidates.iter().map(to_result).collect()
    };

    scored.sort_by(compare_results);
    scored.truncate(k);
    scored
}
