//! The nesting orchestrator.
//!
//! [`Nester`] owns everything that outlives a single evaluation: the
//! session NFP cache, the run metrics, the best results found so far and
//! the population engine. Each call to [`Nester::iterate`] advances the
//! generation when the previous one is fully scored, evaluates every pending
//! individual (in up to three parallel slices) and feeds the outcomes back
//! through one response path.

use crate::clipper::{select_engine, BooleanEngine};
use crate::ga_nesting::{IndividualEvaluator, NestInputs};
use crate::geometry::{NestItem, Polygon, Sheet};
use crate::nfp_cache::NfpCache;
use crate::result::NestResult;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sheetnest_core::ga::{Gene, PopulationItem, Procreant};
use sheetnest_core::progress::{NullProgress, ProgressBar, ProgressSink};
use sheetnest_core::state::NestState;
use sheetnest_core::top_results::{TopNestResults, TryAddResult};
use sheetnest_core::{Error, NestConfig, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Number of population slices evaluated concurrently.
const SLICES: usize = 3;

/// What one call to [`Nester::iterate`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Individuals were scored.
    Evaluated { evaluated: usize },
    /// The run was stopped, hit its generation limit or is errored.
    Stopped,
    /// No unique offspring could be bred; the search is exhausted.
    Converged,
}

/// How a scored nest was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Added within the elite ranks of the top results.
    Elite,
    /// Added below the elite ranks.
    Top,
    Duplicate,
    SubOptimal,
    /// Placed nothing.
    Rejected,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseKind::Elite => "Elite",
            ResponseKind::Top => "Top",
            ResponseKind::Duplicate => "Duplicate",
            ResponseKind::SubOptimal => "Sub-optimal",
            ResponseKind::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

struct Run {
    inputs: NestInputs,
    engine: Arc<dyn BooleanEngine>,
    procreant: Procreant,
}

type Response = (usize, Option<Result<NestResult>>);

/// Genetic nesting driver.
///
/// # Example
///
/// ```rust
/// use sheetnest_d2::{Nester, NestItem, Polygon, Sheet};
/// use sheetnest_core::NestConfig;
///
/// let config = NestConfig::default()
///     .with_population_size(10)
///     .with_parallel(false)
///     .with_seed(7);
/// let mut nester = Nester::new(config).unwrap();
/// nester
///     .start(
///         vec![NestItem::new(Polygon::rectangle(40.0, 20.0), 3)],
///         vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 1)],
///     )
///     .unwrap();
/// nester.run_until(Some(2), None).unwrap();
///
/// let best = nester.best().unwrap().unwrap();
/// assert!(best.unplaced.is_empty());
/// ```
pub struct Nester {
    config: NestConfig,
    cache: NfpCache,
    state: NestState,
    progress: Arc<dyn ProgressSink>,
    top: Mutex<TopNestResults<NestResult>>,
    cancelled: Arc<AtomicBool>,
    rng: StdRng,
    run: Option<Run>,
}

impl Nester {
    pub fn new(config: NestConfig) -> Result<Self> {
        config.validate()?;
        let top = TopNestResults::new(config.population_size, config.top_diversity)?;
        let rng = seeded_rng(config.seed);
        Ok(Self {
            config,
            cache: NfpCache::new(),
            state: NestState::new(),
            progress: Arc::new(NullProgress),
            top: Mutex::new(top),
            cancelled: Arc::new(AtomicBool::new(false)),
            rng,
            run: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &NestConfig {
        &self.config
    }

    /// Prepares the inputs and builds the first generation.
    pub fn start(
        &mut self,
        parts: Vec<NestItem<Polygon>>,
        sheets: Vec<NestItem<Sheet>>,
    ) -> Result<()> {
        match self.start_run(parts, sheets) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn start_run(&mut self, parts: Vec<NestItem<Polygon>>, sheets: Vec<NestItem<Sheet>>) -> Result<()> {
        self.cancelled.store(false, Ordering::Relaxed);
        let engine = select_engine(&self.config)?;
        let inputs = NestInputs::prepare(&self.config, engine.as_ref(), parts, sheets)?;
        let procreant = Procreant::new(
            inputs.part_specs(),
            &self.config,
            Arc::clone(&self.progress),
            &mut self.rng,
        )?;
        self.state.increment_generations();
        log::debug!(
            "Nest started with {} parts on {} sheets using {}",
            inputs.total_parts(),
            inputs.sheets().len(),
            engine.name()
        );
        self.run = Some(Run {
            inputs,
            engine,
            procreant,
        });
        Ok(())
    }

    /// Runs one round: breeds a new generation if the current one is fully
    /// scored, then evaluates every pending individual.
    ///
    /// The first error moves the nester into the errored state, stops it
    /// and is returned; later calls report [`IterationOutcome::Stopped`].
    pub fn iterate(&mut self) -> Result<IterationOutcome> {
        if self.state.is_errored() || self.cancelled.load(Ordering::Relaxed) {
            return Ok(IterationOutcome::Stopped);
        }
        match self.iterate_run() {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn iterate_run(&mut self) -> Result<IterationOutcome> {
        let Some(run) = self.run.as_mut() else {
            return Err(Error::Internal("iterate called before start".into()));
        };
        self.state.increment_iterations();

        if run.procreant.is_current_generation_finished() {
            if let Some(max) = self.config.max_generations {
                if self.state.generations() >= max as usize {
                    return Ok(IterationOutcome::Stopped);
                }
            }
            let size = run.procreant.generate(&mut self.rng);
            self.state.increment_generations();
            self.state.reset_population();
            if size == 0 {
                let reason = Error::DegenerateConvergence(format!(
                    "no unique offspring after {} terminations",
                    run.procreant.terminations()
                ));
                log::debug!("{}", reason);
                self.progress.transient(&reason.to_string());
                self.cancelled.store(true, Ordering::Relaxed);
                return Ok(IterationOutcome::Converged);
            }
        }

        let mut work: Vec<(usize, Gene)> = Vec::new();
        for index in 0..run.procreant.population().len() {
            if let Some(gene) = run.procreant.dispatch(index) {
                work.push((index, gene));
            }
        }
        if work.is_empty() {
            return Ok(IterationOutcome::Evaluated { evaluated: 0 });
        }

        self.progress.transient("Executing Nest...");
        let evaluator = IndividualEvaluator::new(
            &self.config,
            run.engine.as_ref(),
            &self.cache,
            &run.inputs,
            &self.state,
            self.progress.as_ref(),
        );
        let (tx, rx) = mpsc::channel::<Response>();
        let cancelled = self.cancelled.as_ref();
        let state = &self.state;
        if self.config.use_parallel {
            let slice_len = (work.len() + SLICES - 1) / SLICES;
            let evaluator = &evaluator;
            rayon::scope(|s| {
                for slice in work.chunks(slice_len) {
                    let tx = tx.clone();
                    s.spawn(move |_| evaluate_slice(evaluator, slice, cancelled, state, &tx));
                }
            });
        } else {
            evaluate_slice(&evaluator, &work, cancelled, state, &tx);
        }
        drop(tx);

        let mut evaluated = 0;
        let mut failure = None;
        for (index, outcome) in rx {
            match outcome {
                Some(Ok(result)) => {
                    let kind = process_response(
                        &mut run.procreant,
                        &self.top,
                        &self.state,
                        self.progress.as_ref(),
                        result,
                    )?;
                    log::trace!("Nest {} received as {}", index, kind);
                    evaluated += 1;
                }
                Some(Err(e)) => {
                    run.procreant.release(index);
                    failure.get_or_insert(e);
                }
                None => run.procreant.release(index),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(IterationOutcome::Evaluated { evaluated }),
        }
    }

    /// Iterates until stopped, converged, errored, past `deadline`, or until
    /// `max_generations` generations are fully scored.
    pub fn run_until(
        &mut self,
        max_generations: Option<u32>,
        deadline: Option<Instant>,
    ) -> Result<IterationOutcome> {
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(IterationOutcome::Stopped);
            }
            if let Some(max) = max_generations {
                if self.state.generations() >= max as usize && self.is_generation_finished() {
                    return Ok(IterationOutcome::Stopped);
                }
            }
            match self.iterate()? {
                IterationOutcome::Evaluated { .. } => continue,
                other => return Ok(other),
            }
        }
    }

    /// Requests a cooperative stop; work already running completes.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Discards the run, its metrics and its top results. The NFP cache is
    /// kept.
    pub fn reset(&mut self) -> Result<()> {
        self.run = None;
        self.state.reset();
        self.cancelled.store(false, Ordering::Relaxed);
        self.rng = seeded_rng(self.config.seed);
        self.top
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to acquire top results lock: {}", e)))?
            .clear();
        Ok(())
    }

    /// Shared stop flag; storing `true` has the same effect as [`stop`](Self::stop).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_errored(&self) -> bool {
        self.state.is_errored()
    }

    pub fn state(&self) -> &NestState {
        &self.state
    }

    pub fn cache(&self) -> &NfpCache {
        &self.cache
    }

    pub fn inputs(&self) -> Option<&NestInputs> {
        self.run.as_ref().map(|r| &r.inputs)
    }

    pub fn population(&self) -> Option<&[PopulationItem]> {
        self.run.as_ref().map(|r| r.procreant.population())
    }

    pub fn is_generation_finished(&self) -> bool {
        self.run
            .as_ref()
            .map_or(true, |r| r.procreant.is_current_generation_finished())
    }

    /// Copy of the best results, best first.
    pub fn top_results(&self) -> Result<Vec<NestResult>> {
        let top = self
            .top
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to acquire top results lock: {}", e)))?;
        Ok(top.as_slice().to_vec())
    }

    pub fn best(&self) -> Result<Option<NestResult>> {
        let top = self
            .top
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to acquire top results lock: {}", e)))?;
        Ok(top.top().cloned())
    }

    fn fail(&self, error: Error) -> Error {
        if self.state.set_errored() {
            log::error!("Nest run errored: {}", error);
        }
        self.cancelled.store(true, Ordering::Relaxed);
        error
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Evaluates one contiguous slice of the population, reporting every
/// individual: `None` for those skipped after a stop request.
fn evaluate_slice(
    evaluator: &IndividualEvaluator<'_>,
    slice: &[(usize, Gene)],
    cancelled: &AtomicBool,
    state: &NestState,
    tx: &Sender<Response>,
) {
    state.increment_threads();
    for (index, gene) in slice {
        let outcome = if cancelled.load(Ordering::Relaxed) {
            None
        } else {
            let outcome = evaluator.evaluate(*index, gene);
            if outcome.is_err() {
                cancelled.store(true, Ordering::Relaxed);
            }
            Some(outcome)
        };
        if tx.send((*index, outcome)).is_err() {
            break;
        }
    }
    state.decrement_threads();
}

/// Records a scored nest: fitness back into the population, metrics, and
/// an offer to the top results.
fn process_response(
    procreant: &mut Procreant,
    top: &Mutex<TopNestResults<NestResult>>,
    state: &NestState,
    progress: &dyn ProgressSink,
    result: NestResult,
) -> Result<ResponseKind> {
    procreant.set_fitness(result.index, result.fitness())?;
    state.increment_population();
    state.record_nest(
        Duration::from_millis(result.background_time_ms),
        Duration::from_millis(result.placement_time_ms),
    );
    progress.increment_loop(ProgressBar::Primary);

    if !result.is_valid() || result.sheets.is_empty() {
        state.increment_rejected();
        return Ok(ResponseKind::Rejected);
    }

    let placement_ms = result.placement_time_ms;
    let mut top = top
        .lock()
        .map_err(|e| Error::Internal(format!("Failed to acquire top results lock: {}", e)))?;
    let kind = match top.try_add_ranked(result) {
        (TryAddResult::Added, rank) => {
            progress.transient(&format!(
                "New top {} nest found: nesting time = {}ms",
                top.max_capacity(),
                placement_ms
            ));
            progress.top_changed();
            if rank.is_some_and(|r| r < top.elite_survivors()) {
                ResponseKind::Elite
            } else {
                ResponseKind::Top
            }
        }
        (TryAddResult::Duplicate, _) => ResponseKind::Duplicate,
        (TryAddResult::NotAdded, _) => ResponseKind::SubOptimal,
    };
    if !matches!(kind, ResponseKind::Elite | ResponseKind::Top) {
        progress.transient(&format!("Nesting time = {}ms ({})", placement_ms, kind));
    }
    Ok(kind)
}
