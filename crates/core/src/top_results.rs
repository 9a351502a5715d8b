//! Bounded, fitness-ordered list of the best distinct results of a run.

use crate::error::{Error, Result};

/// Anything with a fitness (lower is better).
pub trait Ranked {
    fn fitness(&self) -> f64;
}

/// Minimum number of leading results treated as elite.
pub const ELITE_SURVIVORS_MIN: usize = 20;

/// Outcome of [`TopNestResults::try_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAddResult {
    Added,
    /// Worse than every kept result while the list is full.
    NotAdded,
    /// Too close in fitness to the result it would displace.
    Duplicate,
}

/// Decides whether `payload` differs enough from the `incumbent` at
/// `index` to be kept alongside it.
///
/// At the head of the list any change visible at two decimals counts; below
/// it the gap must exceed `top_diversity` times the incumbent's fitness.
pub fn is_novel(payload: f64, incumbent: f64, index: usize, top_diversity: f64) -> bool {
    if index == 0 {
        round2(incumbent) != round2(payload)
    } else {
        (incumbent - payload).abs() > incumbent * top_diversity
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Best distinct results, sorted ascending by fitness.
#[derive(Debug, Clone)]
pub struct TopNestResults<T> {
    items: Vec<T>,
    elite_survivors: usize,
    max_capacity: usize,
    top_diversity: f64,
}

impl<T: Ranked> TopNestResults<T> {
    pub fn new(population_size: usize, top_diversity: f64) -> Result<Self> {
        let scaled = population_size * 2 / 10;
        if scaled == 0 {
            return Err(Error::InvalidConfig(format!(
                "population_size {population_size} leaves no room for top results"
            )));
        }
        let elite_survivors = (population_size / 10).max(ELITE_SURVIVORS_MIN);
        Ok(Self {
            items: Vec::new(),
            elite_survivors,
            max_capacity: scaled.max(elite_survivors),
            top_diversity,
        })
    }

    pub fn elite_survivors(&self) -> usize {
        self.elite_survivors
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Inserts `payload` at its rank if it is novel, evicting the worst
    /// result when the list overflows.
    pub fn try_add(&mut self, payload: T) -> TryAddResult {
        self.try_add_ranked(payload).0
    }

    /// Like [`try_add`](Self::try_add), also returning the rank the payload
    /// was stored at.
    pub fn try_add_ranked(&mut self, payload: T) -> (TryAddResult, Option<usize>) {
        let fitness = payload.fitness();
        if self.items.is_empty() {
            self.items.push(payload);
            return (TryAddResult::Added, Some(0));
        }

        let position = self
            .items
            .iter()
            .position(|item| item.fitness() >= fitness)
            .unwrap_or(self.items.len());

        if position == self.items.len() {
            if self.items.len() < self.max_capacity {
                self.items.push(payload);
                return (TryAddResult::Added, Some(position));
            }
            return (TryAddResult::NotAdded, None);
        }

        let incumbent = self.items[position].fitness();
        if !is_novel(fitness, incumbent, position, self.top_diversity) {
            return (TryAddResult::Duplicate, None);
        }

        self.items.insert(position, payload);
        if self.items.len() > self.max_capacity {
            self.items.truncate(self.max_capacity);
        }
        (TryAddResult::Added, Some(position))
    }

    pub fn top(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Rank of the first result equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.items.iter().position(|i| i == item)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    #[derive(Debug, Clone, PartialEq)]
    struct Scored(f64);

    impl Ranked for Scored {
        fn fitness(&self) -> f64 {
            self.0
        }
    }

    fn fitnesses(top: &TopNestResults<Scored>) -> Vec<f64> {
        top.iter().map(|s| s.0).collect()
    }

    #[test]
    fn test_capacity_rules() {
        let top = TopNestResults::<Scored>::new(10, 0.1).unwrap();
        assert_eq!(top.elite_survivors(), 20);
        assert_eq!(top.max_capacity(), 20);

        let top = TopNestResults::<Scored>::new(500, 0.1).unwrap();
        assert_eq!(top.elite_survivors(), 50);
        assert_eq!(top.max_capacity(), 100);

        assert!(TopNestResults::<Scored>::new(4, 0.1).is_err());
    }

    #[test]
    fn test_near_duplicate_rejected() {
        let mut top = TopNestResults::new(10, 0.1).unwrap();
        assert_eq!(top.try_add(Scored(100.0)), TryAddResult::Added);
        assert_eq!(top.try_add(Scored(200.0)), TryAddResult::Added);

        assert_eq!(top.try_add(Scored(195.0)), TryAddResult::Duplicate);
        assert_eq!(fitnesses(&top), vec![100.0, 200.0]);

        assert_eq!(top.try_add(Scored(150.0)), TryAddResult::Added);
        assert_eq!(fitnesses(&top), vec![100.0, 150.0, 200.0]);
    }

    #[test]
    fn test_head_compares_at_two_decimals() {
        let mut top = TopNestResults::new(10, 0.1).unwrap();
        top.try_add(Scored(100.0));
        assert_eq!(top.try_add(Scored(99.999)), TryAddResult::Duplicate);
        let (result, rank) = top.try_add_ranked(Scored(99.9));
        assert_eq!(result, TryAddResult::Added);
        assert_eq!(rank, Some(0));
        assert_eq!(top.top(), Some(&Scored(99.9)));
    }

    #[test]
    fn test_full_list_rejects_worse() {
        let mut top = TopNestResults::new(10, 0.0).unwrap();
        for i in 0..20 {
            assert_eq!(top.try_add(Scored(i as f64 * 10.0)), TryAddResult::Added);
        }
        assert_eq!(top.try_add(Scored(1000.0)), TryAddResult::NotAdded);
        assert_eq!(top.try_add(Scored(5.0)), TryAddResult::Added);
        assert_eq!(top.len(), 20);
        assert_eq!(top.get(19), Some(&Scored(180.0)));
    }

    #[test]
    fn test_random_insertions_stay_sorted_and_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut top = TopNestResults::new(60, 0.05).unwrap();
        for _ in 0..500 {
            top.try_add(Scored(rng.gen_range(1.0..1000.0)));
            assert!(top.len() <= top.max_capacity());
            let f = fitnesses(&top);
            assert!(f.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_index_of() {
        let mut top = TopNestResults::new(10, 0.1).unwrap();
        top.try_add(Scored(50.0));
        top.try_add(Scored(10.0));
        assert_eq!(top.index_of(&Scored(50.0)), Some(1));
        assert_eq!(top.index_of(&Scored(7.0)), None);
    }

    #[test]
    fn test_clear() {
        let mut top = TopNestResults::new(10, 0.1).unwrap();
        top.try_add(Scored(1.0));
        top.clear();
        assert!(top.is_empty());
        assert!(top.top().is_none());
    }
}
