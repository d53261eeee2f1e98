//! Stabilization engine - consecutive-agreement scoring across ticks
//!
//! The display is assumed nearly static between real coordinate changes,
//! so a lock requires the same comparison key on several consecutive reads:
//! - miss: score decays by `decay_step`, key kept
//! - same key: score grows by `grow_step`, capped at 100
//! - different key: score restarts at `grow_step`, no carry-over
//!
//! At 100 the candidate is emitted and the engine returns to searching with
//! no key, so even an unchanged display needs a fresh run to lock again.

use crate::domain::types::{Candidate, StabilizerPhase};
use tracing::debug;

pub const MAX_SCORE: u8 = 100;

/// Consistency scorer owned by a single pipeline
#[derive(Debug, Clone)]
pub struct Stabilizer {
    score: u8,
    last_key: Option<String>,
    grow_step: u8,
    decay_step: u8,
}

impl Stabilizer {
    /// `grow_step` is clamped to 1..=100 and `decay_step` to 0..=100
    pub fn new(grow_step: u8, decay_step: u8) -> Self {
        Self {
            score: 0,
            last_key: None,
            grow_step: grow_step.clamp(1, MAX_SCORE),
            decay_step: decay_step.min(MAX_SCORE),
        }
    }

    #[inline]
    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    pub fn grow_step(&self) -> u8 {
        self.grow_step
    }

    pub fn decay_step(&self) -> u8 {
        self.decay_step
    }

    pub fn phase(&self) -> StabilizerPhase {
        match self.score {
            0 => StabilizerPhase::Searching,
            MAX_SCORE => StabilizerPhase::Ready,
            _ => StabilizerPhase::Accumulating,
        }
    }

    /// Feed one tick. Returns the candidate when it is ready to lock.
    pub fn observe(&mut self, candidate: Option<Candidate>) -> Option<Candidate> {
        let Some(candidate) = candidate else {
            self.score = self.score.saturating_sub(self.decay_step);
            return None;
        };

        if self.last_key.as_deref() == Some(candidate.raw_key.as_str()) {
            self.score = self.score.saturating_add(self.grow_step).min(MAX_SCORE);
        } else {
            debug!(
                key = %candidate.raw_key,
                previous = ?self.last_key,
                dropped_score = %self.score,
                "stabilizer_new_key"
            );
            self.score = self.grow_step;
            self.last_key = Some(candidate.raw_key.clone());
        }

        if self.phase() == StabilizerPhase::Ready {
            debug!(key = %candidate.raw_key, "stabilizer_ready");
            self.reset();
            return Some(candidate);
        }
        None
    }

    /// Back to searching with no remembered key
    pub fn reset(&mut self) {
        self.score = 0;
        self.last_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str) -> Option<Candidate> {
        Some(Candidate { lat: 1.0, lng: 2.0, raw_key: key.to_string() })
    }

    #[test]
    fn test_four_agreeing_ticks_lock_once() {
        let mut stabilizer = Stabilizer::new(25, 5);
        let mut scores = Vec::new();

        for _ in 0..3 {
            assert!(stabilizer.observe(candidate("a")).is_none());
            scores.push(stabilizer.score());
        }
        assert_eq!(scores, vec![25, 50, 75]);
        assert_eq!(stabilizer.phase(), StabilizerPhase::Accumulating);

        let locked = stabilizer.observe(candidate("a"));
        assert_eq!(locked.map(|c| c.raw_key), Some("a".to_string()));
        assert_eq!(stabilizer.score(), 0);
        assert_eq!(stabilizer.last_key(), None);
        assert_eq!(stabilizer.phase(), StabilizerPhase::Searching);
    }

    #[test]
    fn test_unchanged_value_needs_fresh_run_after_lock() {
        let mut stabilizer = Stabilizer::new(25, 5);
        let locks = (0..8).filter(|_| stabilizer.observe(candidate("a")).is_some()).count();
        assert_eq!(locks, 2);
    }

    #[test]
    fn test_disagreeing_tick_restarts_without_carry_over() {
        let mut stabilizer = Stabilizer::new(25, 5);
        stabilizer.observe(candidate("a"));
        stabilizer.observe(candidate("a"));
        assert_eq!(stabilizer.score(), 50);

        stabilizer.observe(candidate("b"));
        assert_eq!(stabilizer.score(), 25);
        assert_eq!(stabilizer.last_key(), Some("b"));

        stabilizer.observe(candidate("a"));
        assert_eq!(stabilizer.score(), 25);
        assert_eq!(stabilizer.last_key(), Some("a"));
    }

    #[test]
    fn test_miss_decays_and_keeps_key() {
        let mut stabilizer = Stabilizer::new(25, 10);
        stabilizer.observe(candidate("a"));
        stabilizer.observe(None);
        assert_eq!(stabilizer.score(), 15);
        assert_eq!(stabilizer.last_key(), Some("a"));

        stabilizer.observe(None);
        stabilizer.observe(None);
        assert_eq!(stabilizer.score(), 0);
        assert_eq!(stabilizer.phase(), StabilizerPhase::Searching);
        assert_eq!(stabilizer.last_key(), Some("a"));

        // Same key after decaying to zero accumulates from zero
        stabilizer.observe(candidate("a"));
        assert_eq!(stabilizer.score(), 25);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let mut stabilizer = Stabilizer::new(34, 7);
        // Deterministic mix of hits, misses and key changes
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..10_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let input = match seed % 4 {
                0 => None,
                1 => candidate("b"),
                _ => candidate("a"),
            };
            stabilizer.observe(input);
            assert!(stabilizer.score() <= MAX_SCORE);
            assert_ne!(stabilizer.phase(), StabilizerPhase::Ready);
        }
    }

    #[test]
    fn test_grow_step_34_locks_on_third_frame() {
        let mut stabilizer = Stabilizer::new(34, 5);
        assert!(stabilizer.observe(candidate("a")).is_none());
        assert!(stabilizer.observe(candidate("a")).is_none());
        assert_eq!(stabilizer.score(), 68);
        assert!(stabilizer.observe(candidate("a")).is_some());
    }

    #[test]
    fn test_step_clamping() {
        let stabilizer = Stabilizer::new(0, 200);
        assert_eq!(stabilizer.grow_step(), 1);
        assert_eq!(stabilizer.decay_step(), 100);

        let mut instant = Stabilizer::new(100, 5);
        assert!(instant.observe(candidate("a")).is_some());
    }

    #[test]
    fn test_reset_clears_key() {
        let mut stabilizer = Stabilizer::new(25, 5);
        stabilizer.observe(candidate("a"));
        stabilizer.reset();
        assert_eq!(stabilizer.score(), 0);
        assert_eq!(stabilizer.last_key(), None);
    }
}
