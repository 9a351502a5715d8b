//! Run configuration.

use crate::error::{Error, Result};
use crate::geometry::StrictAngle;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How candidate positions are scored during placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlacementType {
    /// Weighted bounding box (`width * weight + height`), which pulls parts to
    /// the left.
    #[default]
    Gravity,
    /// Area of the combined bounding box.
    BoundingBox,
    /// Area of the combined convex hull.
    ConvexHull,
}

/// Which contour of a Minkowski sum is kept as the outer no-fit polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MinkowskiSumPick {
    #[default]
    Largest,
    Smallest,
}

/// Configuration for a nesting run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestConfig {
    /// Individuals per generation.
    pub population_size: usize,
    /// Per-position mutation probability, in percent.
    pub mutation_rate: u32,
    /// Number of evenly spaced rotations a part may take.
    pub rotations: usize,
    /// Run-wide rotation restriction for parts without their own.
    pub strict_angle: StrictAngle,
    /// Gap kept between parts.
    pub spacing: f64,
    /// Inset applied to every sheet outline.
    pub sheet_spacing: f64,
    /// Candidate scoring rule.
    pub placement_type: PlacementType,
    /// Outer no-fit contour selection.
    pub minkowski_pick: MinkowskiSumPick,
    /// Evaluate individuals on the rayon pool.
    pub use_parallel: bool,
    /// Place priority parts before the rest on every sheet.
    pub use_priority: bool,
    /// Maximum time spent looking for one unique offspring.
    pub procreation_timeout: Duration,
    /// Relative fitness gap required for a new top result to count as novel.
    pub top_diversity: f64,
    /// Integer scale applied before boolean operations.
    pub clipper_scale: f64,
    pub curve_tolerance: f64,
    /// Reward coincident edges between neighbouring parts.
    pub merge_lines: bool,
    /// Weight of merged length relative to the placement score.
    pub time_ratio: f64,
    /// Drawing units per inch; merged lines shorter than half of it are ignored.
    pub scale: f64,
    /// Use the native Minkowski backend instead of the built-in one.
    pub use_native_minkowski: bool,
    /// Width weight of the gravity score and the sheet bounds fitness.
    pub gravity_width_weight: f64,
    /// Stop after this many generations.
    pub max_generations: Option<u32>,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            mutation_rate: 10,
            rotations: 4,
            strict_angle: StrictAngle::None,
            spacing: 0.0,
            sheet_spacing: 0.0,
            placement_type: PlacementType::Gravity,
            minkowski_pick: MinkowskiSumPick::Largest,
            use_parallel: true,
            use_priority: true,
            procreation_timeout: Duration::from_millis(5000),
            top_diversity: 0.1,
            clipper_scale: 10_000_000.0,
            curve_tolerance: 0.3,
            merge_lines: false,
            time_ratio: 0.5,
            scale: 72.0,
            use_native_minkowski: false,
            gravity_width_weight: 3.0,
            max_generations: None,
            seed: None,
        }
    }
}

impl NestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_mutation_rate(mut self, percent: u32) -> Self {
        self.mutation_rate = percent;
        self
    }

    pub fn with_rotations(mut self, rotations: usize) -> Self {
        self.rotations = rotations;
        self
    }

    pub fn with_strict_angle(mut self, strict_angle: StrictAngle) -> Self {
        self.strict_angle = strict_angle;
        self
    }

    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_sheet_spacing(mut self, spacing: f64) -> Self {
        self.sheet_spacing = spacing;
        self
    }

    pub fn with_placement_type(mut self, placement_type: PlacementType) -> Self {
        self.placement_type = placement_type;
        self
    }

    pub fn with_minkowski_pick(mut self, pick: MinkowskiSumPick) -> Self {
        self.minkowski_pick = pick;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.use_parallel = enabled;
        self
    }

    pub fn with_priority(mut self, enabled: bool) -> Self {
        self.use_priority = enabled;
        self
    }

    pub fn with_procreation_timeout(mut self, timeout: Duration) -> Self {
        self.procreation_timeout = timeout;
        self
    }

    pub fn with_top_diversity(mut self, diversity: f64) -> Self {
        self.top_diversity = diversity;
        self
    }

    pub fn with_clipper_scale(mut self, scale: f64) -> Self {
        self.clipper_scale = scale;
        self
    }

    pub fn with_merge_lines(mut self, enabled: bool) -> Self {
        self.merge_lines = enabled;
        self
    }

    pub fn with_native_minkowski(mut self, enabled: bool) -> Self {
        self.use_native_minkowski = enabled;
        self
    }

    pub fn with_max_generations(mut self, generations: u32) -> Self {
        self.max_generations = Some(generations);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of top results kept regardless of novelty ranking.
    pub fn elite_survivors(&self) -> usize {
        (self.population_size / 10).max(20)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(Error::InvalidConfig(
                "population_size must be at least 1".into(),
            ));
        }
        if self.population_size * 2 / 10 == 0 {
            return Err(Error::InvalidConfig(format!(
                "population_size {} is too small to keep any top results",
                self.population_size
            )));
        }
        if self.rotations == 0 {
            return Err(Error::InvalidConfig("rotations must be at least 1".into()));
        }
        if self.mutation_rate > 100 {
            return Err(Error::InvalidConfig(format!(
                "mutation_rate {} exceeds 100 percent",
                self.mutation_rate
            )));
        }
        for (name, value) in [
            ("spacing", self.spacing),
            ("sheet_spacing", self.sheet_spacing),
            ("top_diversity", self.top_diversity),
            ("curve_tolerance", self.curve_tolerance),
            ("time_ratio", self.time_ratio),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.clipper_scale.is_finite() || self.clipper_scale <= 0.0 {
            return Err(Error::InvalidConfig(
                "clipper_scale must be positive".into(),
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidConfig("scale must be positive".into()));
        }
        if !self.gravity_width_weight.is_finite() || self.gravity_width_weight <= 0.0 {
            return Err(Error::InvalidConfig(
                "gravity_width_weight must be positive".into(),
            ));
        }
        Ok(())
    }
}
