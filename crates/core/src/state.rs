//! Run metrics shared between the orchestrator and its workers.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lock-free counters describing a nesting run.
#[derive(Debug, Default)]
pub struct NestState {
    generations: AtomicUsize,
    iterations: AtomicUsize,
    population: AtomicUsize,
    nest_count: AtomicUsize,
    rejected: AtomicUsize,
    threads: AtomicI64,
    total_nest_time_ms: AtomicU64,
    last_nest_time_ms: AtomicU64,
    total_placement_time_ms: AtomicU64,
    last_placement_time_ms: AtomicU64,
    /// `f64` bits.
    nfp_cache_percent: AtomicU64,
    minkowski_calls: AtomicUsize,
    errored: AtomicBool,
}

/// Point-in-time copy of [`NestState`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateSnapshot {
    pub generations: usize,
    pub iterations: usize,
    pub population: usize,
    pub nest_count: usize,
    pub rejected: usize,
    pub threads: i64,
    pub average_nest_time_ms: u64,
    pub last_nest_time_ms: u64,
    pub average_placement_time_ms: u64,
    pub last_placement_time_ms: u64,
    pub nfp_cache_percent: f64,
    pub minkowski_calls: usize,
    pub errored: bool,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl NestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::Relaxed)
    }

    pub fn increment_generations(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> usize {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn increment_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Individuals evaluated in the current generation.
    pub fn population(&self) -> usize {
        self.population.load(Ordering::Relaxed)
    }

    pub fn increment_population(&self) {
        self.population.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_population(&self) {
        self.population.store(0, Ordering::Relaxed);
    }

    pub fn nest_count(&self) -> usize {
        self.nest_count.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Evaluation slices currently running.
    pub fn threads(&self) -> i64 {
        self.threads.load(Ordering::Relaxed)
    }

    pub fn increment_threads(&self) {
        self.threads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_threads(&self) {
        self.threads.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records one completed nest.
    pub fn record_nest(&self, nest_time: Duration, placement_time: Duration) {
        let nest_ms = millis(nest_time);
        let placement_ms = millis(placement_time);
        self.nest_count.fetch_add(1, Ordering::Relaxed);
        self.total_nest_time_ms.fetch_add(nest_ms, Ordering::Relaxed);
        self.last_nest_time_ms.store(nest_ms, Ordering::Relaxed);
        self.total_placement_time_ms
            .fetch_add(placement_ms, Ordering::Relaxed);
        self.last_placement_time_ms
            .store(placement_ms, Ordering::Relaxed);
    }

    pub fn average_nest_time_ms(&self) -> u64 {
        match self.nest_count() as u64 {
            0 => 0,
            n => self.total_nest_time_ms.load(Ordering::Relaxed) / n,
        }
    }

    pub fn average_placement_time_ms(&self) -> u64 {
        match self.nest_count() as u64 {
            0 => 0,
            n => self.total_placement_time_ms.load(Ordering::Relaxed) / n,
        }
    }

    pub fn nfp_cache_percent(&self) -> f64 {
        f64::from_bits(self.nfp_cache_percent.load(Ordering::Relaxed))
    }

    pub fn set_nfp_cache_stats(&self, percent_cached: f64, minkowski_calls: usize) {
        self.nfp_cache_percent
            .store(percent_cached.to_bits(), Ordering::Relaxed);
        self.minkowski_calls
            .store(minkowski_calls, Ordering::Relaxed);
    }

    pub fn minkowski_calls(&self) -> usize {
        self.minkowski_calls.load(Ordering::Relaxed)
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// Flags the run as errored. Returns true only for the first caller.
    pub fn set_errored(&self) -> bool {
        self.errored
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            generations: self.generations(),
            iterations: self.iterations(),
            population: self.population(),
            nest_count: self.nest_count(),
            rejected: self.rejected(),
            threads: self.threads(),
            average_nest_time_ms: self.average_nest_time_ms(),
            last_nest_time_ms: self.last_nest_time_ms.load(Ordering::Relaxed),
            average_placement_time_ms: self.average_placement_time_ms(),
            last_placement_time_ms: self.last_placement_time_ms.load(Ordering::Relaxed),
            nfp_cache_percent: self.nfp_cache_percent(),
            minkowski_calls: self.minkowski_calls(),
            errored: self.is_errored(),
        }
    }

    /// Zeroes every metric and clears the errored flag.
    pub fn reset(&self) {
        for counter in [
            &self.generations,
            &self.iterations,
            &self.population,
            &self.nest_count,
            &self.rejected,
            &self.minkowski_calls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for timer in [
            &self.total_nest_time_ms,
            &self.last_nest_time_ms,
            &self.total_placement_time_ms,
            &self.last_placement_time_ms,
            &self.nfp_cache_percent,
        ] {
            timer.store(0, Ordering::Relaxed);
        }
        self.threads.store(0, Ordering::Relaxed);
        self.errored.store(false, Ordering::Release);
    }
}
