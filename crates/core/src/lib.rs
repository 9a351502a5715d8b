//! # sheetnest core
//!
//! Engine-independent building blocks of the sheetnest 2D nesting engine.
//!
//! ## Core Components
//!
//! - **Configuration**: [`NestConfig`], [`PlacementType`], [`MinkowskiSumPick`]
//! - **Geometry primitives**: [`Point`], [`Bounds`], [`StrictAngle`]
//! - **Genetic search**: [`Procreant`], [`Gene`], [`Chromosome`], [`PopulationItem`]
//! - **Result ranking**: [`TopNestResults`], [`Ranked`]
//! - **Run metrics**: [`NestState`]
//! - **Progress reporting**: [`ProgressSink`], [`CallbackProgress`]
//!
//! ## Configuration
//!
//! ```rust
//! use sheetnest_core::{NestConfig, PlacementType};
//!
//! let config = NestConfig::new()
//!     .with_population_size(20)
//!     .with_rotations(8)
//!     .with_spacing(2.0)
//!     .with_placement_type(PlacementType::BoundingBox);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod config;
pub mod error;
pub mod ga;
pub mod geometry;
pub mod progress;
pub mod robust;
pub mod state;
pub mod top_results;

// Re-exports
pub use config::{MinkowskiSumPick, NestConfig, PlacementType};
pub use error::{Error, Result};
pub use ga::{Chromosome, Gene, PartSpec, PopulationItem, Procreant};
pub use geometry::{almost_equal, normalize_degrees, Bounds, Point, StrictAngle};
pub use progress::{
    CallbackProgress, NullProgress, ProgressBar, ProgressCallback, ProgressEvent, ProgressSink,
};
pub use state::{NestState, StateSnapshot};
pub use top_results::{Ranked, TopNestResults, TryAddResult};
