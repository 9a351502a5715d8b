//! Integer-scaled boolean operations and Minkowski sums.
//!
//! Geometry is multiplied by the run's `clipper_scale` and rounded before any
//! boolean operation, so every engine sees the same integer grid regardless of
//! the input units. [`BooleanEngine`] is the seam the rest of the crate talks
//! to; [`OverlayEngine`] implements it on top of `i_overlay`.

use crate::geometry::{polygon_area, Polygon};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use sheetnest_core::geometry::Point;
use sheetnest_core::{Error, NestConfig, Result};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A vertex on the integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntPoint {
    pub x: i64,
    pub y: i64,
}

impl IntPoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for IntPoint {
    type Output = IntPoint;

    fn add(self, rhs: IntPoint) -> IntPoint {
        IntPoint::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Neg for IntPoint {
    type Output = IntPoint;

    fn neg(self) -> IntPoint {
        IntPoint::new(-self.x, -self.y)
    }
}

pub type IntPath = Vec<IntPoint>;

/// Winding rule used to decide what is inside a set of paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillType {
    EvenOdd,
    NonZero,
}

impl From<FillType> for FillRule {
    fn from(fill: FillType) -> Self {
        match fill {
            FillType::EvenOdd => FillRule::EvenOdd,
            FillType::NonZero => FillRule::NonZero,
        }
    }
}

// ============================================================================
// Scaling helpers
// ============================================================================

/// Converts to the integer grid.
pub fn scale_up(points: &[Point], scale: f64) -> IntPath {
    points
        .iter()
        .map(|p| IntPoint::new((p.x * scale).round() as i64, (p.y * scale).round() as i64))
        .collect()
}

/// Converts back from the integer grid. Produced vertices are not exact.
pub fn scale_down(path: &[IntPoint], scale: f64) -> Vec<Point> {
    path.iter()
        .map(|p| Point::approximate(p.x as f64 / scale, p.y as f64 / scale))
        .collect()
}

/// Signed area of an integer path (counter-clockwise positive).
pub fn path_area(path: &[IntPoint]) -> f64 {
    let n = path.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice: i128 = 0;
    for i in 0..n {
        let a = path[i];
        let b = path[(i + 1) % n];
        twice += a.x as i128 * b.y as i128 - b.x as i128 * a.y as i128;
    }
    twice as f64 * 0.5
}

/// Returns the path oriented counter-clockwise (`positive`) or clockwise.
pub fn orient_path(mut path: IntPath, positive: bool) -> IntPath {
    if (path_area(&path) > 0.0) != positive {
        path.reverse();
    }
    path
}

pub fn translate_path(path: &[IntPoint], offset: IntPoint) -> IntPath {
    path.iter().map(|&p| p + offset).collect()
}

/// Converts a polygon and its holes into paths: the outline counter-clockwise,
/// holes clockwise, all moved by `(dx, dy)` first.
pub fn polygon_to_paths(polygon: &Polygon, dx: f64, dy: f64, scale: f64) -> Vec<IntPath> {
    let mut paths = Vec::with_capacity(1 + polygon.children().len());
    let shifted: Vec<Point> = polygon.points().iter().map(|p| p.translated(dx, dy)).collect();
    paths.push(orient_path(scale_up(&shifted, scale), true));
    for child in polygon.children() {
        let shifted: Vec<Point> = child.points().iter().map(|p| p.translated(dx, dy)).collect();
        paths.push(orient_path(scale_up(&shifted, scale), false));
    }
    paths
}

// ============================================================================
// Engine seam
// ============================================================================

/// Boolean and Minkowski operations on integer paths.
///
/// Results list outer contours counter-clockwise and holes clockwise.
/// Degenerate contours (fewer than three vertices or zero area) are dropped.
pub trait BooleanEngine: Send + Sync {
    fn union(&self, subject: &[IntPath], fill: FillType) -> Result<Vec<IntPath>>;

    fn difference(
        &self,
        subject: &[IntPath],
        clip: &[IntPath],
        fill: FillType,
    ) -> Result<Vec<IntPath>>;

    fn intersection(
        &self,
        subject: &[IntPath],
        clip: &[IntPath],
        fill: FillType,
    ) -> Result<Vec<IntPath>>;

    /// Minkowski sum of `pattern` swept along the closed `path`.
    ///
    /// The result is the region covered by the pattern's boundary as it
    /// travels once around the path, as oriented contours.
    fn minkowski_sum(&self, pattern: &[IntPoint], path: &[IntPoint]) -> Result<Vec<IntPath>>;

    fn name(&self) -> &'static str;
}

/// Picks the engine requested by the configuration.
pub fn select_engine(config: &NestConfig) -> Result<Arc<dyn BooleanEngine>> {
    if config.use_native_minkowski {
        return Err(Error::NativeInterop(
            "no native Minkowski backend is linked into this build".into(),
        ));
    }
    Ok(Arc::new(OverlayEngine::new()))
}

/// `i_overlay`-backed engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayEngine;

impl OverlayEngine {
    pub fn new() -> Self {
        Self
    }

    fn execute(
        &self,
        subject: &[IntPath],
        clip: &[IntPath],
        rule: OverlayRule,
        fill: FillType,
    ) -> Result<Vec<IntPath>> {
        for path in subject.iter().chain(clip) {
            if path.iter().any(|p| p.x.unsigned_abs() > MAX_COORD || p.y.unsigned_abs() > MAX_COORD)
            {
                return Err(Error::GeometryEngine(
                    "coordinate exceeds the exact float range after scaling".into(),
                ));
            }
        }

        let to_float = |paths: &[IntPath]| -> Vec<Vec<[f64; 2]>> {
            paths
                .iter()
                .filter(|p| p.len() >= 3)
                .map(|p| p.iter().map(|q| [q.x as f64, q.y as f64]).collect())
                .collect()
        };
        let subject = to_float(subject);
        let clip = to_float(clip);

        let shapes = subject.overlay(&clip, rule, FillRule::from(fill));

        let mut result = Vec::new();
        for shape in shapes {
            for (i, contour) in shape.into_iter().enumerate() {
                let path: IntPath = contour
                    .iter()
                    .map(|c| IntPoint::new(c[0].round() as i64, c[1].round() as i64))
                    .collect();
                if path.len() < 3 || path_area(&path) == 0.0 {
                    continue;
                }
                result.push(orient_path(path, i == 0));
            }
        }
        Ok(result)
    }
}

/// Largest magnitude exactly representable once converted to `f64`.
const MAX_COORD: u64 = 1 << 52;

impl BooleanEngine for OverlayEngine {
    fn union(&self, subject: &[IntPath], fill: FillType) -> Result<Vec<IntPath>> {
        if subject.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(subject, &[], OverlayRule::Union, fill)
    }

    fn difference(
        &self,
        subject: &[IntPath],
        clip: &[IntPath],
        fill: FillType,
    ) -> Result<Vec<IntPath>> {
        if subject.is_empty() {
            return Ok(Vec::new());
        }
        if clip.is_empty() {
            return self.union(subject, fill);
        }
        self.execute(subject, clip, OverlayRule::Difference, fill)
    }

    fn intersection(
        &self,
        subject: &[IntPath],
        clip: &[IntPath],
        fill: FillType,
    ) -> Result<Vec<IntPath>> {
        if subject.is_empty() || clip.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(subject, clip, OverlayRule::Intersect, fill)
    }

    fn minkowski_sum(&self, pattern: &[IntPoint], path: &[IntPoint]) -> Result<Vec<IntPath>> {
        if pattern.len() < 3 || path.len() < 3 {
            return Err(Error::GeometryEngine(format!(
                "Minkowski sum needs closed outlines, got {} and {} vertices",
                pattern.len(),
                path.len()
            )));
        }
        let quads = minkowski_quads(pattern, path);
        if quads.is_empty() {
            return Err(Error::GeometryEngine(
                "Minkowski sum produced no area".into(),
            ));
        }
        self.union(&quads, FillType::NonZero)
    }

    fn name(&self) -> &'static str {
        "i_overlay"
    }
}

/// One quadrilateral per (path edge, pattern edge) pair, oriented
/// counter-clockwise. Zero-area quads are skipped.
fn minkowski_quads(pattern: &[IntPoint], path: &[IntPoint]) -> Vec<IntPath> {
    let n = path.len();
    let m = pattern.len();
    let mut quads = Vec::with_capacity(n * m);
    for i in 0..n {
        let p0 = path[i];
        let p1 = path[(i + 1) % n];
        for j in 0..m {
            let q0 = pattern[j];
            let q1 = pattern[(j + 1) % m];
            let quad = vec![p0 + q0, p1 + q0, p1 + q1, p0 + q1];
            if path_area(&quad) != 0.0 {
                quads.push(orient_path(quad, true));
            }
        }
    }
    quads
}

// ============================================================================
// Offsetting
// ============================================================================

/// Grows (`delta > 0`) or shrinks a polygon outline with mitered corners,
/// cleaned up through a union on the integer grid.
///
/// Corners sharper than `miter_limit` times `delta` are beveled. Returns
/// `None` when the outline vanishes.
pub fn offset_points(
    engine: &dyn BooleanEngine,
    points: &[Point],
    delta: f64,
    miter_limit: f64,
    scale: f64,
) -> Result<Option<Vec<Point>>> {
    if delta == 0.0 || points.len() < 3 {
        return Ok(Some(points.to_vec()));
    }
    let ccw = polygon_area(points) > 0.0;
    let ring: Vec<Point> = if ccw {
        points.to_vec()
    } else {
        points.iter().rev().copied().collect()
    };

    let n = ring.len();
    let normal = |a: Point, b: Point| -> (f64, f64) {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len = (dx * dx + dy * dy).sqrt();
        if len < f64::EPSILON {
            (0.0, 0.0)
        } else {
            (dy / len, -dx / len)
        }
    };

    let mut raw = Vec::with_capacity(n * 2);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let curr = ring[i];
        let next = ring[(i + 1) % n];
        let n1 = normal(prev, curr);
        let n2 = normal(curr, next);
        let cos = n1.0 * n2.0 + n1.1 * n2.1;
        let ratio = ((1.0 + cos) / 2.0).sqrt();

        if ratio > f64::EPSILON && 1.0 / ratio <= miter_limit {
            let k = delta / (1.0 + cos);
            raw.push(Point::new(curr.x + (n1.0 + n2.0) * k, curr.y + (n1.1 + n2.1) * k));
        } else {
            raw.push(Point::new(curr.x + n1.0 * delta, curr.y + n1.1 * delta));
            raw.push(Point::new(curr.x + n2.0 * delta, curr.y + n2.1 * delta));
        }
    }

    let cleaned = engine.union(&[scale_up(&raw, scale)], FillType::NonZero)?;
    let largest = cleaned
        .into_iter()
        .filter(|p| path_area(p) > 0.0)
        .max_by(|a, b| path_area(a).total_cmp(&path_area(b)));

    Ok(largest.map(|path| {
        let mut out = scale_down(&path, scale);
        for p in &mut out {
            p.exact = true;
        }
        if !ccw {
            out.reverse();
        }
        out
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: i64, y: i64, size: i64) -> IntPath {
        vec![
            IntPoint::new(x, y),
            IntPoint::new(x + size, y),
            IntPoint::new(x + size, y + size),
            IntPoint::new(x, y + size),
        ]
    }

    fn total_area(paths: &[IntPath]) -> f64 {
        paths.iter().map(|p| path_area(p)).sum()
    }

    #[test]
    fn test_union_overlapping_squares() {
        let engine = OverlayEngine::new();
        let result = engine
            .union(&[square(0, 0, 10), square(5, 0, 10)], FillType::NonZero)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_relative_eq!(total_area(&result), 150.0);
    }

    #[test]
    fn test_difference_leaves_frame() {
        let engine = OverlayEngine::new();
        let result = engine
            .difference(&[square(0, 0, 10)], &[square(2, 2, 6)], FillType::EvenOdd)
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_relative_eq!(total_area(&result), 64.0);
        assert!(result.iter().any(|p| path_area(p) < 0.0));
    }

    #[test]
    fn test_intersection() {
        let engine = OverlayEngine::new();
        let result = engine
            .intersection(&[square(0, 0, 10)], &[square(5, 5, 10)], FillType::NonZero)
            .unwrap();
        assert_relative_eq!(total_area(&result), 25.0);
        assert!(engine
            .intersection(&[square(0, 0, 10)], &[], FillType::NonZero)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_nonzero_union_respects_holes() {
        let engine = OverlayEngine::new();
        let hole = orient_path(square(2, 2, 6), false);
        let result = engine
            .union(&[square(0, 0, 10), hole], FillType::NonZero)
            .unwrap();
        assert_relative_eq!(total_area(&result), 64.0);
    }

    #[test]
    fn test_minkowski_sum_of_squares() {
        let engine = OverlayEngine::new();
        let pattern: IntPath = square(0, 0, 4).into_iter().map(|p| -p).collect();
        let result = engine.minkowski_sum(&pattern, &square(0, 0, 10)).unwrap();

        let outer = result
            .iter()
            .max_by(|a, b| path_area(a).total_cmp(&path_area(b)))
            .unwrap();
        assert_relative_eq!(path_area(outer), 196.0);
        // The hole of the swept ring is where the pattern fits inside.
        assert_relative_eq!(total_area(&result), 196.0 - 36.0);
    }

    #[test]
    fn test_minkowski_rejects_degenerate() {
        let engine = OverlayEngine::new();
        let line = vec![IntPoint::new(0, 0), IntPoint::new(1, 0)];
        assert!(matches!(
            engine.minkowski_sum(&line, &square(0, 0, 3)),
            Err(Error::GeometryEngine(_))
        ));
    }

    #[test]
    fn test_offset_square() {
        let engine = OverlayEngine::new();
        let pts = Polygon::rectangle(10.0, 10.0).points().to_vec();
        let grown = offset_points(&engine, &pts, 1.0, 4.0, 1000.0).unwrap().unwrap();
        assert_relative_eq!(polygon_area(&grown), 144.0, epsilon = 1e-6);

        let shrunk = offset_points(&engine, &pts, -1.0, 4.0, 1000.0).unwrap().unwrap();
        assert_relative_eq!(polygon_area(&shrunk), 64.0, epsilon = 1e-6);

        let reversed: Vec<Point> = pts.iter().rev().copied().collect();
        let grown = offset_points(&engine, &reversed, 1.0, 4.0, 1000.0).unwrap().unwrap();
        assert_relative_eq!(polygon_area(&grown), -144.0, epsilon = 1e-6);
    }

    #[test]
    fn test_select_engine() {
        assert!(select_engine(&NestConfig::default()).is_ok());
        let native = NestConfig::default().with_native_minkowski(true);
        assert!(matches!(
            select_engine(&native),
            Err(Error::NativeInterop(_))
        ));
    }
}
