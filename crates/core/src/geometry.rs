//! Planar primitives shared by the nesting crates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Absolute tolerance used by [`almost_equal`].
pub const TOLERANCE: f64 = 1e-9;

/// Compares two floats with the default [`TOLERANCE`].
#[inline]
pub fn almost_equal(a: f64, b: f64) -> bool {
    almost_equal_eps(a, b, TOLERANCE)
}

/// Compares two floats with an explicit tolerance.
#[inline]
pub fn almost_equal_eps(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// A polygon vertex.
///
/// `exact` marks vertices that come straight from the input outline rather
/// than from curve approximation; only exact vertices take part in
/// merged-line detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[cfg_attr(feature = "serde", serde(default = "exact_default"))]
    pub exact: bool,
}

#[cfg(feature = "serde")]
fn exact_default() -> bool {
    true
}

impl Point {
    /// Creates an exact point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, exact: true }
    }

    /// Creates a point produced by approximation.
    pub const fn approximate(x: f64, y: f64) -> Self {
        Self { x, y, exact: false }
    }

    /// Rotates the point about the origin by `degrees` (counter-clockwise).
    pub fn rotated(&self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
            exact: self.exact,
        }
    }

    /// Returns the point moved by `(dx, dy)`.
    #[inline]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            exact: self.exact,
        }
    }

    #[inline]
    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Coordinate-wise comparison with the default tolerance.
    pub fn almost_equals(&self, other: &Point) -> bool {
        almost_equal(self.x, other.x) && almost_equal(self.y, other.y)
    }

    #[inline]
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Computes the bounds of a point set, or `None` when it is empty.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Bounds::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Bounds {
        Bounds::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// True when `other` could fit inside with room to spare on both axes.
    pub fn strictly_larger_than(&self, other: &Bounds) -> bool {
        self.width > other.width && self.height > other.height
    }

    /// True when `other` fits within this size, allowing for `eps` slack.
    pub fn can_contain_size(&self, other: &Bounds, eps: f64) -> bool {
        other.width <= self.width + eps && other.height <= self.height + eps
    }
}

/// Restriction on the rotations a part may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StrictAngle {
    /// Any multiple of `360 / rotations`.
    #[default]
    None,
    /// Either as drawn or turned upside down.
    AsPreviewed,
    /// Quarter turns only, never as drawn.
    Rotate90,
}

impl StrictAngle {
    /// The fixed angle set for restricted modes.
    pub fn allowed_angles(self) -> Option<&'static [f64]> {
        match self {
            StrictAngle::None => None,
            StrictAngle::AsPreviewed => Some(&[0.0, 180.0]),
            StrictAngle::Rotate90 => Some(&[90.0, 270.0]),
        }
    }

    /// A part without its own restriction inherits the run-wide one.
    pub fn or(self, fallback: StrictAngle) -> StrictAngle {
        match self {
            StrictAngle::None => fallback,
            other => other,
        }
    }
}
