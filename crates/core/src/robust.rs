//! Exact orientation predicates.
//!
//! Built on Shewchuk's adaptive-precision `orient2d` (via the `robust` crate) so
//! that boundary tests on placed outlines do not flip sign on nearly collinear
//! input.
//!
//! ```rust
//! use sheetnest_core::geometry::Point;
//! use sheetnest_core::robust::{orient2d, Orientation};
//!
//! let o = orient2d(Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.5, 1.0));
//! assert_eq!(o, Orientation::CounterClockwise);
//! ```

use crate::geometry::Point;
use robust::{orient2d as robust_orient2d, Coord};

/// Result of an orientation test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Left turn.
    CounterClockwise,
    /// Right turn.
    Clockwise,
    Collinear,
}

impl Orientation {
    #[inline]
    pub fn is_collinear(self) -> bool {
        matches!(self, Orientation::Collinear)
    }
}

#[inline]
fn coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Orientation of `c` relative to the directed line `a -> b`.
pub fn orient2d(a: Point, b: Point, c: Point) -> Orientation {
    let det = robust_orient2d(coord(a), coord(b), coord(c));
    if det > 0.0 {
        Orientation::CounterClockwise
    } else if det < 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::Collinear
    }
}

/// True when `p` lies on the closed segment `a-b`.
pub fn on_segment(p: Point, a: Point, b: Point) -> bool {
    orient2d(a, b, p).is_collinear()
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Point-in-ring test.
///
/// Returns `None` when the point lies on the ring's boundary, otherwise
/// whether it is strictly inside. Orientation of the ring does not matter.
pub fn point_in_ring(p: Point, ring: &[Point]) -> Option<bool> {
    if ring.len() < 3 {
        return Some(false);
    }
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if on_segment(p, a, b) {
            return None;
        }
        // Crossing number on the upward/downward edge with exact side test.
        if (a.y > p.y) != (b.y > p.y) {
            let side = orient2d(a, b, p);
            let upward = b.y > a.y;
            if (upward && side == Orientation::CounterClockwise)
                || (!upward && side == Orientation::Clockwise)
            {
                inside = !inside;
            }
        }
    }
    Some(inside)
}
