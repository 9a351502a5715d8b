//! Placement of single parts onto the sheet in progress.
//!
//! The feasible region for a part's reference vertex is the sheet's inner NFP
//! minus the union of the outer NFPs of every part already on the sheet. Each
//! vertex of that region is a candidate position; the candidate with the
//! lowest score under the configured [`PlacementType`] wins.

use crate::clipper::{polygon_to_paths, BooleanEngine, FillType, IntPath};
use crate::geometry::{convex_hull, polygon_area, Polygon, Sheet};
use crate::merge_lines::merged_length;
use crate::nfp::Nfp;
use crate::nfp_cache::NfpHelper;
use crate::result::PartPlacement;
use sheetnest_core::geometry::{almost_equal, Bounds, Point};
use sheetnest_core::{NestConfig, PlacementType, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the sheet loop should do after offering a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementFlow {
    /// The part is on the sheet.
    Placed,
    /// The part does not fit; try the next one.
    Continue,
    /// A priority part does not fit; close this sheet.
    Break,
}

/// Feasible region the last part was placed from, with the sheet and the
/// part at its final position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NfpCandidateList {
    pub items: Vec<Polygon>,
    pub sheet: Sheet,
    pub part: Polygon,
}

impl NfpCandidateList {
    pub fn new(items: Vec<Polygon>, sheet: Sheet, part: Polygon) -> Self {
        Self { items, sheet, part }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Union of outer NFPs covering `placements[..index]`.
#[derive(Debug, Clone)]
struct ClipCacheItem {
    index: usize,
    paths: Vec<IntPath>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    x: f64,
    y: f64,
    merged: Option<f64>,
}

impl Candidate {
    fn beats(&self, best: Option<&Candidate>) -> bool {
        let Some(best) = best else {
            return true;
        };
        if almost_equal(self.score, best.score) {
            if almost_equal(self.x, best.x) {
                self.y < best.y && !almost_equal(self.y, best.y)
            } else {
                self.x < best.x
            }
        } else {
            self.score < best.score
        }
    }
}

/// Places parts one at a time on a single sheet.
pub struct PartPlacementWorker<'w, 'a> {
    config: &'w NestConfig,
    helper: &'w NfpHelper<'a>,
    sheet: &'w Sheet,
    placements: Vec<PartPlacement>,
    clip_cache: HashMap<String, ClipCacheItem>,
    merged_length: f64,
    final_nfp: Option<NfpCandidateList>,
}

impl<'w, 'a> PartPlacementWorker<'w, 'a> {
    /// `placements` are the parts already on `sheet`, if it is being reopened.
    pub fn new(
        config: &'w NestConfig,
        helper: &'w NfpHelper<'a>,
        sheet: &'w Sheet,
        placements: Vec<PartPlacement>,
    ) -> Self {
        let merged_length = placements.iter().filter_map(|p| p.merged_length).sum();
        Self {
            config,
            helper,
            sheet,
            placements,
            clip_cache: HashMap::new(),
            merged_length,
            final_nfp: None,
        }
    }

    pub fn placements(&self) -> &[PartPlacement] {
        &self.placements
    }

    pub fn into_placements(self) -> Vec<PartPlacement> {
        self.placements
    }

    pub fn merged_length(&self) -> f64 {
        self.merged_length
    }

    /// Candidate region of the most recent placement.
    pub fn final_nfp(&self) -> Option<&NfpCandidateList> {
        self.final_nfp.as_ref()
    }

    /// Tries to place `part` (already rotated to its gene rotation).
    ///
    /// Boolean engine failures count as "does not fit"; only invariant and
    /// configuration errors are returned.
    pub fn process_part(&mut self, part: &Polygon) -> Result<PlacementFlow> {
        let outcome = if self.placements.is_empty() {
            self.place_first(part)
        } else {
            self.place_next(part)
        };
        match outcome {
            Err(e) if e.is_recoverable() => {
                log::warn!(
                    "Part {} (source {}) skipped after geometry failure: {}",
                    part.id(),
                    part.source(),
                    e
                );
                Ok(self.not_placed(part))
            }
            other => other,
        }
    }

    fn not_placed(&self, part: &Polygon) -> PlacementFlow {
        if part.is_priority() {
            PlacementFlow::Break
        } else {
            PlacementFlow::Continue
        }
    }

    /// The first part goes to the feasible point closest to the sheet's
    /// lower-left corner, turning it until some rotation fits.
    fn place_first(&mut self, part: &Polygon) -> Result<PlacementFlow> {
        let strict = part.strict_angle().or(self.config.strict_angle);
        let (attempts, step) = match strict.allowed_angles() {
            Some(_) => (2, 180.0),
            None => (
                self.config.rotations.max(1),
                360.0 / self.config.rotations.max(1) as f64,
            ),
        };

        let mut candidate = part.clone();
        let mut fit: Option<Arc<Nfp>> = None;
        for _ in 0..attempts {
            let nfp = self.helper.sheet_nfp(self.sheet, &candidate)?;
            if !nfp.is_empty() {
                fit = Some(nfp);
                break;
            }
            candidate = candidate.rotate(step);
        }
        let Some(sheet_nfp) = fit else {
            log::trace!("Part {} does not fit an empty sheet {}", part.id(), self.sheet.id());
            return Ok(PlacementFlow::Continue);
        };

        let origin = self.sheet.bounds();
        let Some(target) = closest_to(&sheet_nfp, Point::new(origin.x, origin.y)) else {
            return Ok(PlacementFlow::Continue);
        };
        let Some(reference) = candidate.first() else {
            return Ok(PlacementFlow::Continue);
        };

        let position = PartPlacement::new(candidate, target.x - reference.x, target.y - reference.y);
        self.commit(position, sheet_nfp.polygons.clone());
        Ok(PlacementFlow::Placed)
    }

    fn place_next(&mut self, part: &Polygon) -> Result<PlacementFlow> {
        let scale = self.helper.scale();
        let engine = self.helper.engine();

        let sheet_nfp = self.helper.sheet_nfp(self.sheet, part)?;
        if sheet_nfp.is_empty() {
            return Ok(self.not_placed(part));
        }

        let Some(combined) = self.combined_nfp(engine, part, scale)? else {
            return Ok(PlacementFlow::Continue);
        };

        let feasible = engine.difference(&sheet_nfp.to_paths(scale), &combined, FillType::EvenOdd)?;
        if feasible.is_empty() {
            return Ok(self.not_placed(part));
        }
        let feasible = Nfp::from_paths(&feasible, scale);

        match self.best_candidate(part, &feasible) {
            Some(best) => {
                let mut position = PartPlacement::new(part.clone(), best.x, best.y);
                if let Some(length) = best.merged {
                    position = position.with_merged_length(length);
                }
                self.commit(position, feasible.polygons);
                Ok(PlacementFlow::Placed)
            }
            None => Ok(self.not_placed(part)),
        }
    }

    /// Union of the outer NFPs of every placed part around `part`, folding in
    /// only the placements added since the last call for this source and
    /// rotation.
    fn combined_nfp(
        &mut self,
        engine: &dyn BooleanEngine,
        part: &Polygon,
        scale: f64,
    ) -> Result<Option<Vec<IntPath>>> {
        let key = format!("s:{}r:{}", part.source(), part.rotation());
        let (start, mut subject) = match self.clip_cache.get(&key) {
            Some(item) => (item.index, item.paths.clone()),
            None => (0, Vec::new()),
        };

        for placed in &self.placements[start..] {
            let Some(nfp) = self.helper.outer_nfp(&placed.part, part)? else {
                log::trace!(
                    "No outer NFP for part {} around part {}",
                    part.id(),
                    placed.id
                );
                return Ok(None);
            };
            subject.extend(polygon_to_paths(&nfp, placed.x, placed.y, scale));
        }

        let combined = if start == self.placements.len() {
            subject
        } else {
            engine.union(&subject, FillType::NonZero)?
        };
        self.clip_cache.insert(
            key,
            ClipCacheItem {
                index: self.placements.len(),
                paths: combined.clone(),
            },
        );
        Ok(Some(combined))
    }

    fn best_candidate(&self, part: &Polygon, feasible: &Nfp) -> Option<Candidate> {
        let reference = part.first()?;
        let all_points: Vec<Point> = self
            .placements
            .iter()
            .flat_map(|p| p.placed_points())
            .collect();
        let placed_bounds = Bounds::from_points(&all_points);
        let placed_hull = convex_hull(&all_points);
        let part_bounds = part.bounds();
        let placed_shapes: Vec<Polygon> = if self.config.merge_lines {
            self.placements.iter().map(|p| p.placed_polygon()).collect()
        } else {
            Vec::new()
        };
        let weight = self.config.gravity_width_weight;

        let mut best: Option<Candidate> = None;
        for vertex in feasible.vertices() {
            let (x, y) = (vertex.x - reference.x, vertex.y - reference.y);

            let mut score = match self.config.placement_type {
                PlacementType::Gravity | PlacementType::BoundingBox => {
                    let shifted = part_bounds.translated(x, y);
                    let rect = placed_bounds.map_or(shifted, |b| b.union(&shifted));
                    if self.config.placement_type == PlacementType::Gravity {
                        rect.width * weight + rect.height
                    } else {
                        rect.width * rect.height
                    }
                }
                PlacementType::ConvexHull => {
                    let mut points = placed_hull.clone();
                    points.extend(part.points().iter().map(|p| p.translated(x, y)));
                    polygon_area(&convex_hull(&points)).abs()
                }
            };

            let mut merged = None;
            if self.config.merge_lines {
                let lines = merged_length(
                    &placed_shapes,
                    &part.shift(x, y),
                    0.5 * self.config.scale,
                    0.1 * self.config.curve_tolerance,
                );
                score -= lines.total_length * self.config.time_ratio;
                merged = Some(lines.total_length);
            }

            let candidate = Candidate { score, x, y, merged };
            if candidate.beats(best.as_ref()) {
                best = Some(candidate);
            }
        }

        if let Some(b) = &best {
            log::trace!(
                "Part {} best candidate ({:.3}, {:.3}) score {:.3}",
                part.id(),
                b.x,
                b.y,
                b.score
            );
        }
        best
    }

    fn commit(&mut self, position: PartPlacement, candidates: Vec<Polygon>) {
        debug_assert!(
            self.placements.iter().all(|p| p.id != position.id),
            "part {} placed twice on sheet {}",
            position.id,
            self.sheet.id()
        );
        if let Some(length) = position.merged_length {
            self.merged_length += length;
        }
        self.final_nfp = Some(NfpCandidateList::new(
            candidates,
            self.sheet.clone(),
            position.placed_polygon(),
        ));
        self.placements.push(position);
    }
}

/// Feasible vertex nearest to `origin`; ties go to the smaller x.
fn closest_to(nfp: &Nfp, origin: Point) -> Option<Point> {
    nfp.vertices().copied().min_by(|a, b| {
        let da = a.distance_squared(&origin);
        let db = b.distance_squared(&origin);
        if almost_equal(da, db) {
            a.x.total_cmp(&b.x)
        } else {
            da.total_cmp(&db)
        }
    })
}
