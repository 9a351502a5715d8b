//! Evaluation of GA individuals.
//!
//! [`NestInputs`] turns the caller's parts and sheets into the prepared
//! shapes every individual is decoded against. [`IndividualEvaluator`] runs
//! one gene through the two evaluation stages:
//!
//! 1. NFP-pair precompute: every (earlier part, later part) pair of the gene
//!    is fetched from the session cache, in parallel when enabled, into a
//!    window cache private to this individual.
//! 2. Placement: the sheet-level loop places the decoded parts and scores
//!    the resulting nest.

use crate::clipper::{offset_points, BooleanEngine};
use crate::geometry::{NestItem, Polygon, Sheet};
use crate::nfp_cache::{DbCacheKey, NfpCache, NfpHelper, WindowCache};
use crate::placement_worker::{PlacementWorker, SheetInstance};
use crate::result::NestResult;
use rayon::prelude::*;
use sheetnest_core::ga::{Gene, PartSpec};
use sheetnest_core::progress::{ProgressBar, ProgressSink};
use sheetnest_core::state::NestState;
use sheetnest_core::{Error, NestConfig, Result};
use std::collections::HashSet;
use std::time::Instant;

/// Miter limit used when offsetting for spacing.
pub const SPACING_MITER_LIMIT: f64 = 4.0;

// ============================================================================
// Input preparation
// ============================================================================

/// Parts and sheets ready for evaluation.
#[derive(Debug, Clone)]
pub struct NestInputs {
    /// Prepared part shapes; the index is the part's source.
    parts: Vec<Polygon>,
    sheets: Vec<SheetInstance>,
    specs: Vec<PartSpec>,
    total_parts: usize,
}

impl NestInputs {
    /// Validates and prepares the inputs.
    ///
    /// Sources are assigned as one running index over parts, then sheets.
    /// With spacing configured, parts grow by half the spacing (their holes
    /// shrink by it) and sheets grow by half the spacing less the sheet
    /// spacing. Sheet items expand into one instance per unit of quantity,
    /// numbered in order.
    pub fn prepare(
        config: &NestConfig,
        engine: &dyn BooleanEngine,
        parts: Vec<NestItem<Polygon>>,
        sheets: Vec<NestItem<Sheet>>,
    ) -> Result<Self> {
        config.validate()?;
        let total_parts: usize = parts.iter().map(|p| p.quantity).sum();
        if total_parts == 0 {
            return Err(Error::InvalidGeometry("no parts to nest".into()));
        }
        if sheets.iter().all(|s| s.quantity == 0) {
            return Err(Error::InvalidGeometry("no sheets to nest onto".into()));
        }

        let part_delta = 0.5 * config.spacing;
        let sheet_delta = 0.5 * config.spacing - config.sheet_spacing;
        let scale = config.clipper_scale;

        let mut prepared_parts = Vec::with_capacity(parts.len());
        let mut specs = Vec::with_capacity(parts.len());
        for (source, item) in parts.into_iter().enumerate() {
            item.polygon.validate()?;
            let mut part = offset_tree(engine, &item.polygon, part_delta, scale)?;
            part.set_source(source);
            specs.push(
                PartSpec::new(source, item.quantity, item.polygon.area())
                    .with_strict_angle(item.polygon.strict_angle()),
            );
            prepared_parts.push(part);
        }

        let first_sheet_source = prepared_parts.len();
        let mut instances = Vec::new();
        for (i, item) in sheets.into_iter().enumerate() {
            item.polygon.validate()?;
            let source = first_sheet_source + i;
            let working = offset_tree(engine, &item.polygon, sheet_delta, scale)?;
            for _ in 0..item.quantity {
                let id = instances.len();
                let mut working = Sheet::new(working.clone()).with_id(id);
                working.polygon_mut().set_source(source);
                let mut original = item.polygon.clone().with_id(id);
                original.polygon_mut().set_source(source);
                instances.push(SheetInstance::new(working, original));
            }
        }

        log::debug!(
            "Prepared {} part instances from {} shapes onto {} sheets",
            total_parts,
            prepared_parts.len(),
            instances.len()
        );
        Ok(Self {
            parts: prepared_parts,
            sheets: instances,
            specs,
            total_parts,
        })
    }

    pub fn parts(&self) -> &[Polygon] {
        &self.parts
    }

    pub fn sheets(&self) -> &[SheetInstance] {
        &self.sheets
    }

    pub fn part_specs(&self) -> &[PartSpec] {
        &self.specs
    }

    /// Number of part instances, which is also the gene length.
    pub fn total_parts(&self) -> usize {
        self.total_parts
    }

    /// Area of every sheet instance, used or not.
    pub fn offered_sheet_area(&self) -> f64 {
        self.sheets.iter().map(|s| s.original.material_area()).sum()
    }

    /// Rotated part instances in gene order.
    pub fn decode(&self, gene: &Gene) -> Result<Vec<Polygon>> {
        gene.iter()
            .map(|c| {
                let shape = self.parts.get(c.source).ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "chromosome {} refers to unknown source {}",
                        c.id, c.source
                    ))
                })?;
                let mut part = shape.rotate(c.rotation);
                part.set_id(c.id);
                Ok(part)
            })
            .collect()
    }
}

/// Offsets the outline by `delta` and every hole by `-delta`.
///
/// A hole that closes up is dropped; an outline that vanishes is an error.
fn offset_tree(
    engine: &dyn BooleanEngine,
    polygon: &Polygon,
    delta: f64,
    scale: f64,
) -> Result<Polygon> {
    if delta == 0.0 {
        return Ok(polygon.clone());
    }
    let outline = offset_points(engine, polygon.points(), delta, SPACING_MITER_LIMIT, scale)?
        .ok_or_else(|| {
            Error::InvalidGeometry(format!(
                "polygon {} vanishes when offset by {}",
                polygon.id(),
                delta
            ))
        })?;

    let mut children = Vec::with_capacity(polygon.children().len());
    for child in polygon.children() {
        match offset_points(engine, child.points(), -delta, SPACING_MITER_LIMIT, scale)? {
            Some(points) => children.push(child.replace_points(points)),
            None => log::debug!("Hole of polygon {} closed by spacing", polygon.id()),
        }
    }
    Ok(polygon.replace_points(outline).with_children(children))
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluates genes against prepared inputs.
pub struct IndividualEvaluator<'e> {
    config: &'e NestConfig,
    engine: &'e dyn BooleanEngine,
    cache: &'e NfpCache,
    inputs: &'e NestInputs,
    state: &'e NestState,
    progress: &'e dyn ProgressSink,
}

impl<'e> IndividualEvaluator<'e> {
    pub fn new(
        config: &'e NestConfig,
        engine: &'e dyn BooleanEngine,
        cache: &'e NfpCache,
        inputs: &'e NestInputs,
        state: &'e NestState,
        progress: &'e dyn ProgressSink,
    ) -> Self {
        Self {
            config,
            engine,
            cache,
            inputs,
            state,
            progress,
        }
    }

    /// Places the gene and returns the scored, validated nest.
    pub fn evaluate(&self, index: usize, gene: &Gene) -> Result<NestResult> {
        let started = Instant::now();
        gene.validate(self.inputs.total_parts())?;
        let parts = self.inputs.decode(gene)?;

        let window = WindowCache::new();
        let helper = NfpHelper::new(self.engine, self.cache, &window, self.config);
        self.precompute(&helper, &window, &parts)?;
        self.state
            .set_nfp_cache_stats(self.cache.percent_cached(), self.cache.misses());

        let placing = Instant::now();
        let mut worker =
            PlacementWorker::new(self.config, &helper, self.inputs.sheets(), self.progress);
        let result = worker
            .place_parts(parts)?
            .with_index(index)
            .with_timings(started.elapsed(), placing.elapsed());
        result.validate()?;

        log::debug!(
            "Nest {}: fitness {:.3}, {} of {} placed on {} sheets",
            index,
            result.fitness(),
            result.placed_count(),
            result.total_parts,
            result.sheets.len()
        );
        Ok(result)
    }

    /// Fills the window cache with the outer NFP of every later part around
    /// every earlier part.
    fn precompute(&self, helper: &NfpHelper<'_>, window: &WindowCache, parts: &[Polygon]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for (i, b) in parts.iter().enumerate() {
            for a in &parts[..i] {
                let key = DbCacheKey::outer(a, b);
                if !window.contains(&key) && seen.insert(key) {
                    pairs.push((a, b));
                }
            }
        }

        self.progress.init_loop(ProgressBar::Secondary, pairs.len());
        let fetch = |&(a, b): &(&Polygon, &Polygon)| -> Result<()> {
            let outcome = helper.outer_nfp(a, b);
            self.progress.increment_loop(ProgressBar::Secondary);
            match outcome {
                Ok(_) => Ok(()),
                Err(e) if e.is_recoverable() => {
                    log::warn!(
                        "Outer NFP of source {} around source {} failed: {}",
                        b.source(),
                        a.source(),
                        e
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        if self.config.use_parallel {
            pairs.par_iter().try_for_each(fetch)
        } else {
            pairs.iter().try_for_each(fetch)
        }
    }
}
