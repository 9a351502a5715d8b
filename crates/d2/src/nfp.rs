//! No-Fit Polygon (NFP) and Inner-Fit Polygon computation.
//!
//! Positions always refer to a part's reference vertex (its first point):
//! placing part `B` at `p` means translating it by `p - B[0]`.
//!
//! - The outer NFP of `A` and `B` bounds every position at which `B` would
//!   overlap `A`. It is one contour of `A ⊕ (-B)`, shifted by `B[0]`.
//! - The inner NFP of a container and a part covers every position at which
//!   the part lies entirely inside the container. It is the container minus
//!   the sweep of `-B` along the container's boundary (and its holes).
//!
//! Everything runs on the integer grid of the supplied [`BooleanEngine`].

use crate::clipper::{
    orient_path, path_area, scale_down, scale_up, translate_path, BooleanEngine, FillType,
    IntPath, IntPoint,
};
use crate::geometry::Polygon;
use sheetnest_core::geometry::Point;
use sheetnest_core::{Error, MinkowskiSumPick, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A region made of independent contours.
///
/// Holes are kept as separate contours with clockwise orientation, so the
/// region is the even-odd fill of all contours.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nfp {
    pub polygons: Vec<Polygon>,
}

impl Nfp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// Converts engine output back to drawing units.
    pub fn from_paths(paths: &[IntPath], scale: f64) -> Self {
        Self {
            polygons: paths
                .iter()
                .map(|p| Polygon::new(scale_down(p, scale)))
                .collect(),
        }
    }

    /// Converts to the engine grid, keeping each contour's orientation.
    pub fn to_paths(&self, scale: f64) -> Vec<IntPath> {
        self.polygons
            .iter()
            .map(|p| scale_up(p.points(), scale))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Total vertex count across all contours.
    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(|p| p.len()).sum()
    }

    /// Every contour vertex; these are the candidate positions.
    pub fn vertices(&self) -> impl Iterator<Item = &Point> {
        self.polygons.iter().flat_map(|p| p.points().iter())
    }

    /// Net area (holes subtract).
    pub fn area(&self) -> f64 {
        self.polygons.iter().map(|p| p.area()).sum()
    }
}

fn negated(points: &[Point], scale: f64) -> IntPath {
    scale_up(points, scale).into_iter().map(|p| -p).collect()
}

fn reference(part: &Polygon, scale: f64) -> Result<(Point, IntPoint)> {
    let b0 = part
        .first()
        .ok_or_else(|| Error::InvalidGeometry(format!("part {} has no vertices", part.id())))?;
    let grid = scale_up(&[b0], scale);
    Ok((b0, grid[0]))
}

/// Computes the outer NFP of `b` orbiting `a` (both already rotated; holes
/// are ignored).
///
/// Returns `None` when the Minkowski sum yields no usable contour.
pub fn compute_outer_nfp(
    engine: &dyn BooleanEngine,
    a: &Polygon,
    b: &Polygon,
    pick: MinkowskiSumPick,
    scale: f64,
) -> Result<Option<Polygon>> {
    if a.len() < 3 || b.len() < 3 {
        return Err(Error::InvalidGeometry(
            "Polygons must have at least 3 vertices".into(),
        ));
    }
    let (b0, _) = reference(b, scale)?;

    let path = orient_path(scale_up(a.points(), scale), true);
    let pattern = negated(b.points(), scale);
    let sums = engine.minkowski_sum(&pattern, &path)?;

    let positive = sums.iter().filter(|p| path_area(p) > 0.0);
    let chosen = match pick {
        MinkowskiSumPick::Largest => {
            positive.max_by(|x, y| path_area(x).total_cmp(&path_area(y)))
        }
        MinkowskiSumPick::Smallest => {
            positive.min_by(|x, y| path_area(x).total_cmp(&path_area(y)))
        }
    };

    Ok(chosen.map(|path| {
        let points = scale_down(path, scale)
            .into_iter()
            .map(|p| p.translated(b0.x, b0.y))
            .collect();
        Polygon::new(points)
    }))
}

/// Computes where `part` (already rotated) fits entirely inside
/// `container`, honouring the container's holes.
///
/// Empty when the part's bounds exceed the container's.
pub fn compute_inner_nfp(
    engine: &dyn BooleanEngine,
    container: &Polygon,
    part: &Polygon,
    scale: f64,
) -> Result<Nfp> {
    if container.len() < 3 || part.len() < 3 {
        return Err(Error::InvalidGeometry(
            "Polygons must have at least 3 vertices".into(),
        ));
    }
    if !container
        .bounds()
        .can_contain_size(&part.bounds(), 1.0 / scale)
    {
        return Ok(Nfp::new());
    }
    // With the part moved so its reference vertex sits at the origin, the
    // sums are already in reference-position coordinates.
    let (_, b0) = reference(part, scale)?;
    let pattern = translate_path(&negated(part.points(), scale), b0);

    let outline = orient_path(scale_up(container.points(), scale), true);
    let mut forbidden = engine.minkowski_sum(&pattern, &outline)?;

    for hole in container.children() {
        let hole_path = orient_path(scale_up(hole.points(), scale), true);
        let Some(&h0) = hole_path.first() else {
            continue;
        };
        forbidden.extend(engine.minkowski_sum(&pattern, &hole_path)?);
        // Reference vertex inside the hole, or the part covering the hole.
        forbidden.push(hole_path);
        forbidden.push(orient_path(translate_path(&pattern, h0), true));
    }

    let region = engine.difference(&[outline], &forbidden, FillType::NonZero)?;
    Ok(Nfp::from_paths(&region, scale))
}

/// Fit regions of `part` inside one hole of an obstacle. Empty unless the
/// hole is strictly wider and taller than the part.
pub fn compute_hole_nfp(
    engine: &dyn BooleanEngine,
    hole: &Polygon,
    part: &Polygon,
    scale: f64,
) -> Result<Vec<Polygon>> {
    if !hole.bounds().strictly_larger_than(&part.bounds()) {
        return Ok(Vec::new());
    }
    let region = compute_inner_nfp(engine, &hole.clone_top(), part, scale)?;
    Ok(region.polygons.into_iter().filter(|p| p.area() > 0.0).collect())
}

/// Fit regions of `part` inside each of `holes`. Attached as children of an
/// outer NFP they carve out the positions where the part nests inside the
/// obstacle's holes.
pub fn compute_hole_nfps(
    engine: &dyn BooleanEngine,
    holes: &[Polygon],
    part: &Polygon,
    scale: f64,
) -> Result<Vec<Polygon>> {
    let mut fits = Vec::new();
    for hole in holes {
        fits.extend(compute_hole_nfp(engine, hole, part, scale)?);
    }
    Ok(fits)
}

/// Outer NFP of `b` around `a` including fit regions for `a`'s holes.
pub fn compute_outer_nfp_with_holes(
    engine: &dyn BooleanEngine,
    a: &Polygon,
    b: &Polygon,
    pick: MinkowskiSumPick,
    scale: f64,
) -> Result<Option<Polygon>> {
    let Some(outer) = compute_outer_nfp(engine, &a.clone_top(), &b.clone_top(), pick, scale)?
    else {
        return Ok(None);
    };
    let children = compute_hole_nfps(engine, a.children(), &b.clone_top(), scale)?;
    Ok(Some(outer.with_children(children)))
}
