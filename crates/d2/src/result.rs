//! Placement results and their fitness.

use crate::geometry::{convex_hull, polygon_area, Polygon, Sheet};
use sheetnest_core::geometry::{Bounds, Point};
use sheetnest_core::{Error, PlacementType, Ranked, Result};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Weight applied to unplaced area relative to the offered sheet area.
pub const UNPLACED_PENALTY: f64 = 100_000_000.0;

/// One part on a sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartPlacement {
    pub id: usize,
    pub source: usize,
    /// Degrees.
    pub rotation: f64,
    /// Translation applied to the rotated part.
    pub x: f64,
    pub y: f64,
    /// Edge length shared with parts placed before it.
    pub merged_length: Option<f64>,
    /// The rotated part, untranslated.
    pub part: Polygon,
}

impl PartPlacement {
    pub fn new(part: Polygon, x: f64, y: f64) -> Self {
        Self {
            id: part.id(),
            source: part.source(),
            rotation: part.rotation(),
            x,
            y,
            merged_length: None,
            part,
        }
    }

    pub fn with_merged_length(mut self, length: f64) -> Self {
        self.merged_length = Some(length);
        self
    }

    /// The part at its final position, holes included.
    pub fn placed_polygon(&self) -> Polygon {
        self.part.shift(self.x, self.y).with_offset(self.x, self.y)
    }

    /// Outline vertices at the final position.
    pub fn placed_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.part
            .points()
            .iter()
            .map(move |p| p.translated(self.x, self.y))
    }
}

/// Components of a sheet's fitness.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetFitness {
    pub bounds: f64,
    pub sheets: f64,
    pub material_wasted: f64,
    pub material_utilization: f64,
}

impl SheetFitness {
    pub fn total(&self) -> f64 {
        self.bounds + self.sheets + self.material_wasted + self.material_utilization
    }
}

/// All parts placed on one sheet instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetPlacement {
    pub sheet: Sheet,
    pub placement_type: PlacementType,
    pub placements: Vec<PartPlacement>,
    pub merged_length: f64,
    fitness: SheetFitness,
}

impl SheetPlacement {
    pub fn new(
        sheet: Sheet,
        placement_type: PlacementType,
        placements: Vec<PartPlacement>,
        merged_length: f64,
        gravity_width_weight: f64,
    ) -> Self {
        let mut placement = Self {
            sheet,
            placement_type,
            placements,
            merged_length,
            fitness: SheetFitness::default(),
        };
        placement.fitness = placement.evaluate(gravity_width_weight);
        placement
    }

    pub fn sheet_id(&self) -> usize {
        self.sheet.id()
    }

    pub fn fitness(&self) -> &SheetFitness {
        &self.fitness
    }

    /// Outline vertices of every placed part.
    pub fn combined_points(&self) -> Vec<Point> {
        self.placements
            .iter()
            .flat_map(|p| p.placed_points())
            .collect()
    }

    /// Bounds of all placed vertices.
    pub fn rect_bounds(&self) -> Bounds {
        Bounds::from_points(&self.combined_points()).unwrap_or_default()
    }

    pub fn hull_area(&self) -> f64 {
        polygon_area(&convex_hull(&self.combined_points())).abs()
    }

    /// Net area of all placed parts.
    pub fn total_parts_area(&self) -> f64 {
        self.placements.iter().map(|p| p.part.net_area()).sum()
    }

    /// Placed part area over sheet area.
    pub fn material_utilization(&self) -> f64 {
        (self.total_parts_area() / self.sheet.material_area()).abs()
    }

    pub fn has_priority_parts(&self) -> bool {
        self.placements.iter().any(|p| p.part.is_priority())
    }

    fn evaluate(&self, width_weight: f64) -> SheetFitness {
        let rect = self.rect_bounds();
        let hull_area = self.hull_area();
        let sheet_area = self.sheet.material_area();
        let mu = self.material_utilization();
        let rect_area = rect.width * rect.height;

        let (area, bound) = match self.placement_type {
            PlacementType::Gravity => {
                let weighted = (rect.width * width_weight + rect.height) / (width_weight + 1.0);
                let sheet_width = self.sheet.width();
                let bound = if sheet_width > 0.0 {
                    rect.width / sheet_width * sheet_area
                } else {
                    sheet_area
                };
                (weighted * weighted, bound)
            }
            PlacementType::BoundingBox | PlacementType::ConvexHull => (rect_area, rect_area),
        };
        let bounds = (bound * 4.0 + area + hull_area) / 7.0;

        let mut wasted = if mu < 0.6 { rect_area * 2.0 } else { sheet_area };
        wasted += hull_area + rect_area;
        wasted *= 2.0;
        wasted -= if mu < 0.6 {
            7.0
        } else {
            6.0 * self.total_parts_area()
        };
        if mu < 0.3 {
            wasted *= 1.25;
        }
        let material_wasted = (wasted / 2.0).max(0.0);

        let utilization = (1.0 - mu).powf(1.1) * sheet_area;
        let material_utilization = if utilization.is_nan() {
            sheet_area
        } else {
            utilization
        };

        SheetFitness {
            bounds,
            sheets: sheet_area,
            material_wasted,
            material_utilization,
        }
    }
}

/// Outcome of placing one gene.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestResult {
    /// Population index of the evaluated individual.
    pub index: usize,
    pub total_parts: usize,
    pub placement_type: PlacementType,
    pub sheets: Vec<SheetPlacement>,
    pub unplaced: Vec<Polygon>,
    pub background_time_ms: u64,
    pub placement_time_ms: u64,
    fitness: f64,
    unplaced_penalty: f64,
    priority_penalty: f64,
}

impl NestResult {
    /// Builds the result and computes its fitness.
    ///
    /// `offered_sheet_area` is the total area of every sheet instance that
    /// was available, used or not.
    pub fn new(
        total_parts: usize,
        placement_type: PlacementType,
        sheets: Vec<SheetPlacement>,
        unplaced: Vec<Polygon>,
        offered_sheet_area: f64,
    ) -> Self {
        let unplaced_area: f64 = unplaced.iter().map(|p| p.area().abs()).sum();
        let unplaced_penalty = if offered_sheet_area > 0.0 {
            UNPLACED_PENALTY * unplaced_area / offered_sheet_area
        } else {
            UNPLACED_PENALTY * unplaced_area
        };
        let priority_penalty: f64 = sheets
            .windows(2)
            .filter(|w| w[1].has_priority_parts())
            .map(|w| w[0].sheet.material_area())
            .sum();
        let sheet_total: f64 = sheets.iter().map(|s| s.fitness().total()).sum();

        Self {
            index: 0,
            total_parts,
            placement_type,
            sheets,
            unplaced,
            background_time_ms: 0,
            placement_time_ms: 0,
            fitness: sheet_total + priority_penalty + unplaced_penalty,
            unplaced_penalty,
            priority_penalty,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_timings(mut self, background: Duration, placement: Duration) -> Self {
        self.background_time_ms = u64::try_from(background.as_millis()).unwrap_or(u64::MAX);
        self.placement_time_ms = u64::try_from(placement.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Lower is better.
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn unplaced_penalty(&self) -> f64 {
        self.unplaced_penalty
    }

    pub fn priority_penalty(&self) -> f64 {
        self.priority_penalty
    }

    /// Sum of the per-sheet fitness components.
    pub fn sheet_fitness(&self) -> SheetFitness {
        self.sheets.iter().fold(SheetFitness::default(), |acc, s| {
            let f = s.fitness();
            SheetFitness {
                bounds: acc.bounds + f.bounds,
                sheets: acc.sheets + f.sheets,
                material_wasted: acc.material_wasted + f.material_wasted,
                material_utilization: acc.material_utilization + f.material_utilization,
            }
        })
    }

    pub fn used_sheets(&self) -> &[SheetPlacement] {
        &self.sheets
    }

    pub fn placed_count(&self) -> usize {
        self.sheets.iter().map(|s| s.placements.len()).sum()
    }

    pub fn total_parts_area(&self) -> f64 {
        self.sheets.iter().map(|s| s.total_parts_area()).sum()
    }

    pub fn total_sheets_area(&self) -> f64 {
        self.sheets.iter().map(|s| s.sheet.material_area()).sum()
    }

    /// Placed part area over used sheet area.
    pub fn material_utilization(&self) -> f64 {
        let sheets = self.total_sheets_area();
        if sheets == 0.0 {
            0.0
        } else {
            (self.total_parts_area() / sheets).abs()
        }
    }

    pub fn merged_length(&self) -> f64 {
        self.sheets.iter().map(|s| s.merged_length).sum()
    }

    pub fn is_valid(&self) -> bool {
        !self.fitness.is_nan() && self.placed_count() + self.unplaced.len() == self.total_parts
    }

    /// Fails with [`Error::InvariantViolation`] when the result is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.fitness.is_nan() {
            return Err(Error::InvariantViolation(format!(
                "nest {} has NaN fitness ({:?})",
                self.index,
                self.sheet_fitness()
            )));
        }
        let accounted = self.placed_count() + self.unplaced.len();
        if accounted != self.total_parts {
            return Err(Error::InvariantViolation(format!(
                "nest {} accounts for {} of {} parts",
                self.index, accounted, self.total_parts
            )));
        }
        Ok(())
    }
}

impl Ranked for NestResult {
    fn fitness(&self) -> f64 {
        self.fitness
    }
}
