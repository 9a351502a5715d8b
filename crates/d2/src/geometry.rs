//! Polygons, sheets and nest input items.

use geo::{ConvexHull, Coord, MultiPoint};
use sheetnest_core::geometry::{normalize_degrees, Bounds, Point, StrictAngle};
use sheetnest_core::robust::point_in_ring;
use sheetnest_core::{Error, Result};
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Signed shoelace area. Counter-clockwise rings are positive.
pub fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area * 0.5
}

/// Convex hull of a point set, counter-clockwise, without the closing point.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mp: MultiPoint<f64> = points
        .iter()
        .map(|p| Coord { x: p.x, y: p.y })
        .collect::<Vec<_>>()
        .into();
    let hull = mp.convex_hull();
    let mut ring: Vec<Point> = hull
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// A closed outline with optional hole outlines.
///
/// Parts carry their nesting identity (`id`, `source`), the rotation they
/// were produced at and their offset once placed.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    id: usize,
    source: usize,
    points: Vec<Point>,
    #[cfg_attr(feature = "serde", serde(default))]
    children: Vec<Polygon>,
    rotation: f64,
    x: f64,
    y: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    is_priority: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    strict_angle: StrictAngle,
    #[cfg_attr(feature = "serde", serde(default))]
    name: Option<String>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    /// Builds a polygon from `(x, y)` pairs.
    pub fn from_xy(vertices: &[(f64, f64)]) -> Self {
        Self::new(vertices.iter().map(|&v| Point::from(v)).collect())
    }

    /// Axis-aligned rectangle with its first vertex at the origin.
    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::from_xy(&[(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)])
    }

    /// Regular polygon approximating a circle of `radius`, bounded by the
    /// first quadrant.
    pub fn circle(radius: f64, segments: usize) -> Self {
        let n = segments.max(8);
        let step = std::f64::consts::TAU / n as f64;
        let points = (0..n)
            .map(|i| {
                let a = i as f64 * step;
                Point::approximate(radius * a.cos() + radius, radius * a.sin() + radius)
            })
            .collect();
        Self::new(points)
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_source(mut self, source: usize) -> Self {
        self.source = source;
        self
    }

    pub fn with_hole(mut self, hole: Polygon) -> Self {
        self.children.push(hole);
        self
    }

    pub fn with_children(mut self, children: Vec<Polygon>) -> Self {
        self.children = children;
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.is_priority = priority;
        self
    }

    pub fn with_strict_angle(mut self, strict_angle: StrictAngle) -> Self {
        self.strict_angle = strict_angle;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn set_source(&mut self, source: usize) {
        self.source = source;
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn children(&self) -> &[Polygon] {
        &self.children
    }

    /// Rotation in degrees relative to the input outline.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn is_priority(&self) -> bool {
        self.is_priority
    }

    pub fn strict_angle(&self) -> StrictAngle {
        self.strict_angle
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reference vertex; placements position this point.
    pub fn first(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Signed area of the outer outline.
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Outer area minus hole areas, always non-negative.
    pub fn net_area(&self) -> f64 {
        let holes: f64 = self.children.iter().map(|c| c.area().abs()).sum();
        (self.area().abs() - holes).max(0.0)
    }

    /// Bounds of the outer outline; zero-sized for an empty polygon.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&self.points).unwrap_or_default()
    }

    pub fn is_counter_clockwise(&self) -> bool {
        self.area() > 0.0
    }

    /// Copy rotated about the origin; holes rotate along and the recorded
    /// rotation accumulates modulo 360.
    pub fn rotate(&self, degrees: f64) -> Polygon {
        Polygon {
            points: self.points.iter().map(|p| p.rotated(degrees)).collect(),
            children: self.children.iter().map(|c| c.rotate(degrees)).collect(),
            rotation: normalize_degrees(self.rotation + degrees),
            ..self.clone_shallow()
        }
    }

    /// Copy with every vertex (holes included) moved by `(dx, dy)`.
    pub fn shift(&self, dx: f64, dy: f64) -> Polygon {
        Polygon {
            points: self.points.iter().map(|p| p.translated(dx, dy)).collect(),
            children: self.children.iter().map(|c| c.shift(dx, dy)).collect(),
            ..self.clone_shallow()
        }
    }

    /// Copy with the outline replaced and no holes.
    pub fn replace_points(&self, points: Vec<Point>) -> Polygon {
        Polygon {
            points,
            ..self.clone_shallow()
        }
    }

    /// Copy without holes.
    pub fn clone_top(&self) -> Polygon {
        Polygon {
            points: self.points.clone(),
            ..self.clone_shallow()
        }
    }

    /// Copy with the vertex order reversed; holes keep their order.
    pub fn reversed(&self) -> Polygon {
        let mut copy = self.clone();
        copy.points.reverse();
        copy
    }

    /// Copy whose outline runs counter-clockwise (`ccw`) or clockwise.
    pub fn oriented(&self, ccw: bool) -> Polygon {
        if self.is_counter_clockwise() == ccw {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// Convex hull of the outer outline.
    pub fn hull(&self) -> Vec<Point> {
        convex_hull(&self.points)
    }

    /// Whether `point` is inside the outline and outside every hole.
    ///
    /// `None` when the point lies on a boundary.
    pub fn contains_point(&self, point: Point) -> Option<bool> {
        match point_in_ring(point, &self.points) {
            Some(true) => {
                for hole in &self.children {
                    match point_in_ring(point, &hole.points) {
                        Some(true) => return Some(false),
                        None => return None,
                        Some(false) => {}
                    }
                }
                Some(true)
            }
            other => other,
        }
    }

    /// Rejects outlines the nester cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.points.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} has {} points, at least 3 required",
                self.id,
                self.points.len()
            )));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} has non-finite coordinates",
                self.id
            )));
        }
        if self.area().abs() <= f64::EPSILON {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} has zero area",
                self.id
            )));
        }
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }

    fn clone_shallow(&self) -> Polygon {
        Polygon {
            id: self.id,
            source: self.source,
            points: Vec::new(),
            children: Vec::new(),
            rotation: self.rotation,
            x: self.x,
            y: self.y,
            is_priority: self.is_priority,
            strict_angle: self.strict_angle,
            name: self.name.clone(),
        }
    }
}

/// One stock sheet.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sheet {
    polygon: Polygon,
}

impl Sheet {
    pub fn new(polygon: Polygon) -> Self {
        Self { polygon }
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::new(Polygon::rectangle(width, height))
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.polygon.set_id(id);
        self
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn polygon_mut(&mut self) -> &mut Polygon {
        &mut self.polygon
    }

    /// Usable material area.
    pub fn material_area(&self) -> f64 {
        self.polygon.net_area()
    }

    pub fn width(&self) -> f64 {
        self.polygon.bounds().width
    }

    pub fn height(&self) -> f64 {
        self.polygon.bounds().height
    }
}

impl Deref for Sheet {
    type Target = Polygon;

    fn deref(&self) -> &Polygon {
        &self.polygon
    }
}

impl From<Polygon> for Sheet {
    fn from(polygon: Polygon) -> Self {
        Sheet::new(polygon)
    }
}

/// An input shape and how many copies of it are wanted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestItem<T> {
    pub polygon: T,
    pub quantity: usize,
}

impl<T> NestItem<T> {
    pub fn new(polygon: T, quantity: usize) -> Self {
        Self { polygon, quantity }
    }
}
