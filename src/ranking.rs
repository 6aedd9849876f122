use crate::models::Candidate;
use std::cmp::Ordering;

/// Score descending, ticker ascending on ties.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.ticker.cmp(&b.ticker))
}

pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare_candidates);
    candidates
}

pub fn best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| compare_candidates(a, b))
}

pub fn top_n(ranked: &[Candidate], n: usize) -> &[Candidate] {
    &ranked[..n.min(ranked.len())]
}
