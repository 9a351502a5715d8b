//! Genetic search over part orderings and rotations.
//!
//! A [`Gene`] is one candidate nest: the order in which part instances are
//! offered to the placer, and the rotation each instance is offered at. The
//! [`Procreant`] owns the population, breeds new generations from evaluated
//! fitness values and rejects every gene it has already seen during the run.
//!
//! # Selection
//!
//! Parents are picked with a rank-weighted roulette over the population
//! sorted by ascending fitness (lower is better), so the front of the list is
//! picked more often than the back.

use crate::config::NestConfig;
use crate::error::{Error, Result};
use crate::geometry::StrictAngle;
use crate::progress::{ProgressBar, ProgressSink};
use rand::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Genes
// ============================================================================

/// Input part as seen by the population engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PartSpec {
    /// Index of the input item the instances are cut from.
    pub source: usize,
    /// Number of instances to nest.
    pub quantity: usize,
    /// Outline area, used for the initial largest-first ordering.
    pub area: f64,
    pub strict_angle: StrictAngle,
}

impl PartSpec {
    pub fn new(source: usize, quantity: usize, area: f64) -> Self {
        Self {
            source,
            quantity,
            area,
            strict_angle: StrictAngle::None,
        }
    }

    pub fn with_strict_angle(mut self, strict_angle: StrictAngle) -> Self {
        self.strict_angle = strict_angle;
        self
    }
}

/// One part instance and its rotation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chromosome {
    /// Instance id, unique within a gene.
    pub id: usize,
    pub source: usize,
    /// Degrees.
    pub rotation: f64,
}

/// Ordered list of chromosomes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gene {
    chromosomes: Vec<Chromosome>,
}

impl Gene {
    pub fn new(chromosomes: Vec<Chromosome>) -> Self {
        Self { chromosomes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chromosome> {
        self.chromosomes.iter()
    }

    /// Identity used for duplicate detection: the ids in order, then the
    /// rotations in order.
    pub fn signature(&self) -> String {
        let ids: Vec<String> = self.chromosomes.iter().map(|c| c.id.to_string()).collect();
        let rotations: Vec<String> = self
            .chromosomes
            .iter()
            .map(|c| c.rotation.to_string())
            .collect();
        format!("{},{}", ids.join(","), rotations.join(","))
    }

    /// Checks that the gene holds exactly the ids `0..expected_len`.
    pub fn validate(&self, expected_len: usize) -> Result<()> {
        if self.chromosomes.len() != expected_len {
            return Err(Error::InvariantViolation(format!(
                "gene has {} chromosomes, expected {}",
                self.chromosomes.len(),
                expected_len
            )));
        }
        let mut seen = vec![false; expected_len];
        for c in &self.chromosomes {
            match seen.get_mut(c.id) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(Error::InvariantViolation(format!(
                        "duplicate part id {} in gene",
                        c.id
                    )))
                }
                None => {
                    return Err(Error::InvariantViolation(format!(
                        "part id {} out of range 0..{}",
                        c.id, expected_len
                    )))
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Gene {
    type Item = &'a Chromosome;
    type IntoIter = std::slice::Iter<'a, Chromosome>;

    fn into_iter(self) -> Self::IntoIter {
        self.chromosomes.iter()
    }
}

/// A gene plus its evaluation state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationItem {
    pub gene: Gene,
    /// Lower is better. `None` until evaluated.
    pub fitness: Option<f64>,
    /// Dispatched to a worker and not yet reported back.
    pub processing: bool,
    /// Position in the population.
    pub index: usize,
}

impl PopulationItem {
    pub fn new(gene: Gene) -> Self {
        Self {
            gene,
            fitness: None,
            processing: false,
            index: 0,
        }
    }

    /// Neither evaluated nor in flight.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.fitness.is_none() && !self.processing
    }
}

/// Ascending fitness; unevaluated items sort last.
fn by_fitness(a: &PopulationItem, b: &PopulationItem) -> Ordering {
    match (a.fitness, b.fitness) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// Procreant
// ============================================================================

/// Population engine.
pub struct Procreant {
    strict_angles: HashMap<usize, StrictAngle>,
    gene_length: usize,
    population_size: usize,
    mutation_rate: u32,
    rotations: usize,
    strict_angle: StrictAngle,
    procreation_timeout: Duration,
    population: Vec<PopulationItem>,
    ancestors: HashSet<String>,
    terminations: usize,
    progress: Arc<dyn ProgressSink>,
}

impl Procreant {
    /// Builds the first generation: the largest-first "adam" gene plus
    /// `population_size - 1` mutations of it, with clones dropped.
    pub fn new<R: Rng>(
        parts: &[PartSpec],
        config: &NestConfig,
        progress: Arc<dyn ProgressSink>,
        rng: &mut R,
    ) -> Result<Self> {
        let gene_length: usize = parts.iter().map(|p| p.quantity).sum();
        if gene_length == 0 {
            return Err(Error::InvalidGeometry("no parts to nest".into()));
        }
        if config.rotations == 0 {
            return Err(Error::InvalidConfig("rotations must be at least 1".into()));
        }

        let mut procreant = Self {
            strict_angles: parts.iter().map(|p| (p.source, p.strict_angle)).collect(),
            gene_length,
            population_size: config.population_size.max(1),
            mutation_rate: config.mutation_rate,
            rotations: config.rotations,
            strict_angle: config.strict_angle,
            procreation_timeout: config.procreation_timeout,
            population: Vec::new(),
            ancestors: HashSet::new(),
            terminations: 0,
            progress,
        };

        let adam = procreant.build_adam(parts, rng);
        procreant
            .progress
            .init_loop(ProgressBar::Primary, procreant.population_size);
        let mut genes = Vec::with_capacity(procreant.population_size);
        for _ in 1..procreant.population_size {
            genes.push(procreant.mutate(&adam, rng));
        }
        genes.insert(0, adam);
        let items = procreant.terminate_clones(genes);
        procreant.set_population(items);

        log::debug!(
            "Initial population: {} unique of {} requested ({} parts)",
            procreant.population.len(),
            procreant.population_size,
            gene_length
        );
        Ok(procreant)
    }

    fn build_adam<R: Rng>(&self, parts: &[PartSpec], rng: &mut R) -> Gene {
        let mut expanded: Vec<(Chromosome, f64)> = Vec::with_capacity(self.gene_length);
        let mut next_id = 0;
        for spec in parts {
            for _ in 0..spec.quantity {
                expanded.push((
                    Chromosome {
                        id: next_id,
                        source: spec.source,
                        rotation: 0.0,
                    },
                    spec.area.abs(),
                ));
                next_id += 1;
            }
        }
        expanded.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let chromosomes = expanded
            .into_iter()
            .map(|(mut c, _)| {
                c.rotation = self.random_rotation(c.source, rng);
                c
            })
            .collect();
        Gene::new(chromosomes)
    }

    pub fn population(&self) -> &[PopulationItem] {
        &self.population
    }

    pub fn gene_length(&self) -> usize {
        self.gene_length
    }

    /// Genes rejected as duplicates so far.
    pub fn terminations(&self) -> usize {
        self.terminations
    }

    /// Number of distinct genes produced during the run.
    pub fn ancestor_count(&self) -> usize {
        self.ancestors.len()
    }

    /// True once every individual has a fitness.
    pub fn is_current_generation_finished(&self) -> bool {
        self.population.iter().all(|p| p.fitness.is_some())
    }

    /// Marks the individual as dispatched and returns a copy of its gene.
    pub fn dispatch(&mut self, index: usize) -> Option<Gene> {
        let item = self.population.get_mut(index)?;
        if !item.is_pending() {
            return None;
        }
        item.processing = true;
        Some(item.gene.clone())
    }

    /// Returns an undelivered individual to the pending state.
    pub fn release(&mut self, index: usize) {
        if let Some(item) = self.population.get_mut(index) {
            item.processing = false;
        }
    }

    /// Records the evaluated fitness of an individual.
    pub fn set_fitness(&mut self, index: usize, fitness: f64) -> Result<()> {
        let item = self.population.get_mut(index).ok_or_else(|| {
            Error::Internal(format!("population has no individual at index {index}"))
        })?;
        item.fitness = Some(fitness);
        item.processing = false;
        Ok(())
    }

    /// Registers the gene's signature; false when it was seen before.
    pub fn is_unique(&mut self, gene: &Gene) -> bool {
        if self.ancestors.insert(gene.signature()) {
            true
        } else {
            self.terminations += 1;
            false
        }
    }

    /// Appends the gene to the population unless it is a duplicate.
    pub fn admit(&mut self, gene: Gene) -> bool {
        if !self.is_unique(&gene) {
            return false;
        }
        let mut item = PopulationItem::new(gene);
        item.index = self.population.len();
        self.population.push(item);
        true
    }

    fn terminate_clones(&mut self, genes: Vec<Gene>) -> Vec<PopulationItem> {
        let mut survivors = Vec::with_capacity(genes.len());
        for gene in genes {
            if self.is_unique(&gene) {
                survivors.push(PopulationItem::new(gene));
                self.progress.increment_loop(ProgressBar::Primary);
            }
        }
        survivors
    }

    fn set_population(&mut self, mut items: Vec<PopulationItem>) {
        for (i, item) in items.iter_mut().enumerate() {
            item.index = i;
        }
        self.population = items;
    }

    /// A rotation permitted for parts of `source`.
    pub fn random_rotation<R: Rng>(&self, source: usize, rng: &mut R) -> f64 {
        let own = self.strict_angles.get(&source).copied().unwrap_or_default();
        match own.or(self.strict_angle).allowed_angles() {
            Some(angles) => angles[rng.gen_range(0..angles.len())],
            None => {
                let step = 360.0 / self.rotations as f64;
                rng.gen_range(0..self.rotations) as f64 * step
            }
        }
    }

    /// Each position independently swaps with its successor and rerolls its
    /// rotation, both with probability `mutation_rate` percent.
    pub fn mutate<R: Rng>(&self, gene: &Gene, rng: &mut R) -> Gene {
        let rate = self.mutation_rate as f64 * 0.01;
        let mut chromosomes = gene.chromosomes.clone();
        let len = chromosomes.len();
        for i in 0..len {
            if rng.gen::<f64>() < rate && i + 1 < len {
                chromosomes.swap(i, i + 1);
            }
            if rng.gen::<f64>() < rate {
                chromosomes[i].rotation = self.random_rotation(chromosomes[i].source, rng);
            }
        }
        Gene::new(chromosomes)
    }

    /// Single-point crossover. Each child keeps one parent's head and takes
    /// the remaining ids in the other parent's order.
    pub fn mate<R: Rng>(male: &Gene, female: &Gene, rng: &mut R) -> (Gene, Gene) {
        let ratio = rng.gen::<f64>().clamp(0.1, 0.9);
        let cut = (ratio * male.len().saturating_sub(1) as f64).round() as usize;
        let cut = cut.min(male.len()).min(female.len());
        (
            complete_gene(&male.chromosomes[..cut], female),
            complete_gene(&female.chromosomes[..cut], male),
        )
    }

    /// Rank-weighted roulette over `0..len` with `exclude` removed.
    pub fn random_weighted_index<R: Rng>(
        len: usize,
        exclude: Option<usize>,
        rng: &mut R,
    ) -> Option<usize> {
        let pool: Vec<usize> = (0..len).filter(|i| Some(*i) != exclude).collect();
        let first = *pool.first()?;
        let n = pool.len() as f64;
        let r: f64 = rng.gen();
        let weight = 1.0 / n;
        let mut lower = 0.0;
        let mut upper = weight;
        for (i, &idx) in pool.iter().enumerate() {
            if r > lower && r < upper {
                return Some(idx);
            }
            lower = upper;
            upper += 2.0 * weight * ((n - i as f64) / n);
        }
        Some(first)
    }

    /// Breeds the next generation and returns its size.
    ///
    /// The best tenth survives unchanged. Offspring are bred until the
    /// population is full or no unique child turned up within the
    /// procreation timeout. A generation that adds nothing beyond its
    /// survivors comes back empty: the search has converged.
    pub fn generate<R: Rng>(&mut self, rng: &mut R) -> usize {
        let mut parents = std::mem::take(&mut self.population);
        parents.sort_by(by_fitness);

        let elite_count = (self.population_size / 10).min(parents.len());
        let mut next: Vec<PopulationItem> = parents
            .iter()
            .take(elite_count)
            .map(|p| PopulationItem {
                gene: p.gene.clone(),
                fitness: p.fitness,
                processing: false,
                index: 0,
            })
            .collect();

        let mut chaperone = Instant::now();
        while parents.len() > 1
            && next.len() < self.population_size
            && chaperone.elapsed() <= self.procreation_timeout
        {
            let Some(male) = Self::random_weighted_index(parents.len(), None, rng) else {
                break;
            };
            let Some(female) = Self::random_weighted_index(parents.len(), Some(male), rng) else {
                break;
            };
            let (son, daughter) = Self::mate(&parents[male].gene, &parents[female].gene, rng);

            let child = self.mutate(&son, rng);
            if self.is_unique(&child) {
                chaperone = Instant::now();
                next.push(PopulationItem::new(child));
                if next.len() < self.population_size {
                    let child = self.mutate(&daughter, rng);
                    if self.is_unique(&child) {
                        next.push(PopulationItem::new(child));
                    }
                }
            } else {
                self.progress.transient(&format!(
                    "Cumulative Terminations={} ({}s)",
                    self.terminations,
                    chaperone.elapsed().as_secs()
                ));
            }
        }

        if next.len() <= elite_count {
            let genes = next.into_iter().map(|p| p.gene).collect();
            next = self.terminate_clones(genes);
        }
        self.set_population(next);

        log::debug!(
            "Generated population of {} (terminations so far: {})",
            self.population.len(),
            self.terminations
        );
        self.population.len()
    }
}

fn complete_gene(head: &[Chromosome], donor: &Gene) -> Gene {
    let taken: HashSet<usize> = head.iter().map(|c| c.id).collect();
    let mut chromosomes = head.to_vec();
    chromosomes.extend(donor.iter().filter(|c| !taken.contains(&c.id)).cloned());
    Gene::new(chromosomes)
}
