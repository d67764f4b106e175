//! Bounded best-k selection over `(id, score)` pairs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored candidate id
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub score: f32,
}

impl Candidate {
    #[inline]
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

// Heap order: the greatest entry is the worst candidate, so `peek` is the
// one to evict. Higher scores rank first, ties go to the smaller id.
#[derive(Debug)]
struct WorstFirst(Candidate);

impl PartialEq for WorstFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WorstFirst {}

impl PartialOrd for WorstFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorstFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .total_cmp(&self.0.score)
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}

/// Keeps the `k` best candidates seen so far
///
/// Ranking is by descending score, then ascending id. Two `TopK` sets built
/// over disjoint inputs can be combined with [`TopK::merge`].
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<WorstFirst>,
}

impl TopK {
    #[inline]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a candidate; returns whether it was kept
    #[inline]
    pub fn push(&mut self, candidate: Candidate) -> bool {
        if self.k == 0 {
            return false;
        }

        let entry = WorstFirst(candidate);
        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }

        match self.heap.peek() {
            Some(worst) if entry < *worst => {
                self.heap.pop();
                self.heap.push(entry);
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn merge(mut self, other: Self) -> Self {
        for entry in other.heap {
            self.push(entry.0);
        }
        self
    }

    /// Best candidate first
    #[inline]
    pub fn into_sorted_vec(self) -> Vec<Candidate> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.0)
            .collect()
    }
}

impl Extend<Candidate> for TopK {
    #[inline]
    fn extend<I: IntoIterator<Item = Candidate>>(&mut self, iter: I) {
        for candidate in iter {
            self.push(candidate);
        }
    }
}
