//! Context batching — redundant deck shuffle with anti-repetition spacing.
//!
//! Large candidate sets are partitioned into fixed-size batches, each used as
//! one inference call's context window. To dampen positional and repetition
//! bias, every candidate enters a working deck several times (controlled
//! redundancy), the deck is shuffled uniformly, and entries are drained under
//! a spacing constraint: an index may not reappear within the recent-window
//! lookback of the output sequence. When a full scan finds no admissible
//! entry the head of the deck is force-placed, which guarantees termination.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Default candidates per inference call.
pub const DEFAULT_BATCH_SIZE: usize = 8;
/// Default number of times each candidate enters the deck.
pub const DEFAULT_REDUNDANCY: usize = 3;

/// Partitions candidate indices into spaced, bounded batches.
#[derive(Debug, Clone)]
pub struct ContextBatcher {
    batch_size: usize,
    redundancy: usize,
    window: usize,
}

impl Default for ContextBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ContextBatcher {
    /// Create a batcher with the default redundancy and a lookback window
    /// equal to the batch size.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            redundancy: DEFAULT_REDUNDANCY,
            window: batch_size.max(1),
        }
    }

    /// Override the redundancy factor (minimum 1).
    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy.max(1);
        self
    }

    /// Override the recent-window lookback.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Produce the batch plan for `count` candidates using a thread-local RNG.
    pub fn plan(&self, count: usize) -> Vec<Vec<usize>> {
        self.plan_with_rng(count, &mut rand::thread_rng())
    }

    /// Deterministic variant for reproducible runs and tests.
    pub fn plan_seeded(&self, count: usize, seed: u64) -> Vec<Vec<usize>> {
        self.plan_with_rng(count, &mut StdRng::seed_from_u64(seed))
    }

    /// Produce the batch plan with a caller-supplied RNG.
    pub fn plan_with_rng<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Vec<usize>> {
        if count == 0 {
            return Vec::new();
        }
        // A set that fits one context window needs no redundancy at all.
        if count <= self.batch_size {
            return vec![(0..count).collect()];
        }

        let mut deck: Vec<usize> = (0..self.redundancy).flat_map(|_| 0..count).collect();
        deck.shuffle(rng);

        let mut ordered: Vec<usize> = Vec::with_capacity(deck.len());
        while !deck.is_empty() {
            let start = ordered.len().saturating_sub(self.window);
            let recent = &ordered[start..];
            let pick = deck
                .iter()
                .position(|idx| !recent.contains(idx))
                // Fully blocked scan: force-place the head to make progress.
                .unwrap_or(0);
            ordered.push(deck.remove(pick));
        }

        let mut batches = chunk_dedup(&ordered, self.batch_size);
        self.redistribute_tail(&mut batches);
        debug!(
            candidates = count,
            batches = batches.len(),
            batch_size = self.batch_size,
            "batch plan ready"
        );
        batches
    }

    /// Fold a trailing partial batch into earlier batches with spare
    /// capacity. Entries that fit nowhere stay behind as a short final
    /// batch; no batch ever exceeds `batch_size`.
    fn redistribute_tail(&self, batches: &mut Vec<Vec<usize>>) {
        if batches.len() < 2 {
            return;
        }
        let is_partial = batches
            .last()
            .map(|b| b.len() < self.batch_size)
            .unwrap_or(false);
        if !is_partial {
            return;
        }
        let orphans = match batches.pop() {
            Some(b) => b,
            None => return,
        };
        let mut leftover = Vec::new();
        for idx in orphans {
            let slot = batches
                .iter_mut()
                .rev()
                .find(|b| b.len() < self.batch_size && !b.contains(&idx));
            match slot {
                Some(batch) => batch.push(idx),
                None => leftover.push(idx),
            }
        }
        if !leftover.is_empty() {
            batches.push(leftover);
        }
    }
}

/// Chunk the drained sequence, dropping any repeat of an index inside one
/// chunk (repeats can only arise from forced placements).
fn chunk_dedup(ordered: &[usize], batch_size: usize) -> Vec<Vec<usize>> {
    ordered
        .chunks(batch_size)
        .map(|chunk| {
            let mut batch: Vec<usize> = Vec::with_capacity(chunk.len());
            for &idx in chunk {
                if !batch.contains(&idx) {
                    batch.push(idx);
                }
            }
            batch
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn coverage(batches: &[Vec<usize>]) -> HashSet<usize> {
        batches.iter().flatten().copied().collect()
    }

    #[test]
    fn test_zero_candidates_zero_batches() {
        assert!(ContextBatcher::new(8).plan_seeded(0, 7).is_empty());
    }

    #[test]
    fn test_small_set_single_batch() {
        let batches = ContextBatcher::new(8).plan_seeded(5, 7);
        assert_eq!(batches, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn test_every_candidate_covered() {
        for seed in 0..20 {
            let batches = ContextBatcher::new(4).plan_seeded(10, seed);
            assert_eq!(coverage(&batches), (0..10).collect::<HashSet<_>>());
            assert!(batches.len() >= 3, "expected at least 3 batches");
        }
    }

    #[test]
    fn test_no_repeats_within_a_batch() {
        for seed in 0..20 {
            let batches = ContextBatcher::new(4).plan_seeded(13, seed);
            for batch in &batches {
                let unique: HashSet<_> = batch.iter().collect();
                assert_eq!(unique.len(), batch.len(), "repeat inside {batch:?}");
            }
        }
    }

    #[test]
    fn test_batch_size_never_exceeded() {
        for seed in 0..20 {
            for batch in ContextBatcher::new(4).plan_seeded(17, seed) {
                assert!(batch.len() <= 4);
            }
        }
    }

    #[test]
    fn test_terminates_with_tiny_window_and_high_redundancy() {
        // Window larger than the distinct index count forces blocked scans.
        let batcher = ContextBatcher::new(16).with_window(64).with_redundancy(5);
        let batches = batcher.plan_seeded(20, 3);
        assert_eq!(coverage(&batches), (0..20).collect::<HashSet<_>>());
    }

    #[test]
    fn test_seeded_plans_are_deterministic() {
        let batcher = ContextBatcher::new(4);
        assert_eq!(batcher.plan_seeded(10, 42), batcher.plan_seeded(10, 42));
    }

    #[test]
    fn test_redundancy_controls_total_entries() {
        let batches = ContextBatcher::new(4).with_redundancy(2).plan_seeded(10, 1);
        let total: usize = batches.iter().map(Vec::len).sum();
        // Dedup may drop forced repeats, never add entries.
        assert!(total <= 20);
        assert!(total >= 10);
    }
}
