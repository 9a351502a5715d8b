//! NFP caching.
//!
//! Two levels:
//!
//! - [`NfpCache`] lives for the whole session and is shared by every
//!   individual and generation. Entries are keyed by the exact rotated
//!   geometry, so a hit is always structurally identical to a recomputation.
//! - [`WindowCache`] belongs to the evaluation of one individual and maps
//!   `(source, rotation)` pairs to the NFPs precomputed for its gene.
//!
//! [`NfpHelper`] puts both behind the two lookups the placer needs.

use crate::clipper::BooleanEngine;
use crate::geometry::Polygon;
use crate::nfp::{compute_hole_nfp, compute_inner_nfp, compute_outer_nfp, Nfp};
use sheetnest_core::geometry::Point;
use sheetnest_core::{Error, MinkowskiSumPick, NestConfig, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

// ============================================================================
// Session cache
// ============================================================================

/// Structural identity of an NFP computation.
///
/// The integer grid scale is part of the identity: the same geometry
/// quantised at another precision is a different entry. So are `a`'s holes,
/// which shape inner NFPs.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct NfpCacheKey {
    points_a: Vec<(u64, u64)>,
    holes_a: Vec<Vec<(u64, u64)>>,
    points_b: Vec<(u64, u64)>,
    rotation_a: u64,
    rotation_b: u64,
    source_a: usize,
    source_b: usize,
    pick: MinkowskiSumPick,
    scale: u64,
}

fn point_bits(points: &[Point]) -> Vec<(u64, u64)> {
    points.iter().map(|p| (p.x.to_bits(), p.y.to_bits())).collect()
}

impl NfpCacheKey {
    /// Key for two already rotated polygons.
    pub fn new(a: &Polygon, b: &Polygon, pick: MinkowskiSumPick, scale: f64) -> Self {
        Self {
            points_a: point_bits(a.points()),
            holes_a: a.children().iter().map(|h| point_bits(h.points())).collect(),
            points_b: point_bits(b.points()),
            rotation_a: a.rotation().to_bits(),
            rotation_b: b.rotation().to_bits(),
            source_a: a.source(),
            source_b: b.source(),
            pick,
            scale: scale.to_bits(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| Error::Internal(format!("Failed to acquire NFP cache lock: {}", e)))
}

/// Thread-safe, session-wide NFP cache.
///
/// Computations run without holding a lock. When two workers miss the same
/// key at once both compute it, the first insertion is kept and both callers
/// get that stored value.
#[derive(Default)]
pub struct NfpCache {
    outer: Mutex<HashMap<NfpCacheKey, Option<Arc<Polygon>>>>,
    inner: Mutex<HashMap<NfpCacheKey, Arc<Nfp>>>,
    holes: Mutex<HashMap<NfpCacheKey, Arc<Vec<Polygon>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl fmt::Debug for NfpCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NfpCache")
            .field("entries", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

impl NfpCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_compute<V: Clone>(
        &self,
        map: &Mutex<HashMap<NfpCacheKey, V>>,
        key: NfpCacheKey,
        compute: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(hit) = lock(map)?.get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = compute()?;
        Ok(lock(map)?.entry(key).or_insert(computed).clone())
    }

    /// Outer NFP of `b` around `a`, both already rotated. Holes are not
    /// consulted.
    pub fn outer_nfp(
        &self,
        engine: &dyn BooleanEngine,
        a: &Polygon,
        b: &Polygon,
        pick: MinkowskiSumPick,
        scale: f64,
    ) -> Result<Option<Arc<Polygon>>> {
        let key = NfpCacheKey::new(a, b, pick, scale);
        self.get_or_compute(&self.outer, key, || {
            Ok(compute_outer_nfp(engine, a, b, pick, scale)?.map(Arc::new))
        })
    }

    /// Inner NFP of `part` (already rotated) within `container`.
    pub fn inner_nfp(
        &self,
        engine: &dyn BooleanEngine,
        container: &Polygon,
        part: &Polygon,
        scale: f64,
    ) -> Result<Arc<Nfp>> {
        let key = NfpCacheKey::new(container, part, MinkowskiSumPick::Largest, scale);
        self.get_or_compute(&self.inner, key, || {
            Ok(Arc::new(compute_inner_nfp(engine, container, part, scale)?))
        })
    }

    /// Fit regions of `part` (already rotated) inside one hole of a placed
    /// obstacle, in the obstacle's frame.
    pub fn hole_nfp(
        &self,
        engine: &dyn BooleanEngine,
        hole: &Polygon,
        part: &Polygon,
        scale: f64,
    ) -> Result<Arc<Vec<Polygon>>> {
        let key = NfpCacheKey::new(hole, part, MinkowskiSumPick::Largest, scale);
        self.get_or_compute(&self.holes, key, || {
            Ok(Arc::new(compute_hole_nfp(engine, hole, part, scale)?))
        })
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that required a computation.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Share of lookups answered from the cache, in percent.
    pub fn percent_cached(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total * 100.0
        }
    }

    pub fn len(&self) -> usize {
        let outer = self.outer.lock().map(|m| m.len()).unwrap_or(0);
        let inner = self.inner.lock().map(|m| m.len()).unwrap_or(0);
        let holes = self.holes.lock().map(|m| m.len()).unwrap_or(0);
        outer + inner + holes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Per-individual cache
// ============================================================================

/// Which side of the obstacle an NFP describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NfpKind {
    Outer,
    Inner,
}

/// Key of a [`WindowCache`] entry.
///
/// Rotations are compared at 1e-4 degree resolution.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DbCacheKey(String);

impl DbCacheKey {
    pub fn new(
        source_a: usize,
        source_b: usize,
        rotation_a: f64,
        rotation_b: f64,
        kind: NfpKind,
    ) -> Self {
        Self(format!(
            "A{}B{}Arot{}Brot{};{:?}",
            source_a,
            source_b,
            (rotation_a * 10_000.0).round() as i64,
            (rotation_b * 10_000.0).round() as i64,
            kind
        ))
    }

    /// Key for `b` orbiting `a` at their current rotations.
    pub fn outer(a: &Polygon, b: &Polygon) -> Self {
        Self::new(a.source(), b.source(), a.rotation(), b.rotation(), NfpKind::Outer)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// NFPs prepared for one individual.
#[derive(Debug, Default)]
pub struct WindowCache {
    entries: RwLock<HashMap<DbCacheKey, Arc<Polygon>>>,
}

impl WindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: DbCacheKey, nfp: Arc<Polygon>) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| {
            Error::Internal(format!("Failed to acquire window cache write lock: {}", e))
        })?;
        entries.insert(key, nfp);
        Ok(())
    }

    pub fn find(&self, key: &DbCacheKey) -> Option<Arc<Polygon>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    pub fn contains(&self, key: &DbCacheKey) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Lookup facade
// ============================================================================

/// NFP lookups for one placement pass.
pub struct NfpHelper<'a> {
    engine: &'a dyn BooleanEngine,
    cache: &'a NfpCache,
    window: &'a WindowCache,
    pick: MinkowskiSumPick,
    scale: f64,
}

impl<'a> NfpHelper<'a> {
    pub fn new(
        engine: &'a dyn BooleanEngine,
        cache: &'a NfpCache,
        window: &'a WindowCache,
        config: &NestConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            window,
            pick: config.minkowski_pick,
            scale: config.clipper_scale,
        }
    }

    pub fn engine(&self) -> &'a dyn BooleanEngine {
        self.engine
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Outer NFP of `b` around the placed part `a`, with `a`'s hole fits as
    /// children. Falls back to computing (and remembering) pairs the
    /// individual did not precompute.
    pub fn outer_nfp(&self, a: &Polygon, b: &Polygon) -> Result<Option<Arc<Polygon>>> {
        let key = DbCacheKey::outer(a, b);
        if let Some(hit) = self.window.find(&key) {
            return Ok(Some(hit));
        }

        let top_b = b.clone_top();
        let Some(outer) = self
            .cache
            .outer_nfp(self.engine, &a.clone_top(), &top_b, self.pick, self.scale)?
        else {
            return Ok(None);
        };
        let mut children = Vec::new();
        for hole in a.children() {
            let fits = self.cache.hole_nfp(self.engine, hole, &top_b, self.scale)?;
            children.extend(fits.iter().cloned());
        }
        let nfp = Arc::new(outer.as_ref().clone().with_children(children));
        self.window.insert(key, Arc::clone(&nfp))?;
        Ok(Some(nfp))
    }

    /// Where `part` fits on `sheet`.
    pub fn sheet_nfp(&self, sheet: &Polygon, part: &Polygon) -> Result<Arc<Nfp>> {
        self.cache
            .inner_nfp(self.engine, sheet, &part.clone_top(), self.scale)
    }
}
