//! # sheetnest 2D
//!
//! Genetic nesting of irregular 2D parts onto stock sheets.
//!
//! Parts are placed one at a time at positions derived from no-fit polygons
//! (NFPs): the locus of reference-point positions where a part would touch
//! but not overlap another part, or stay inside a sheet. A genetic search
//! over part order and rotation drives repeated placement passes, and the
//! best layouts are kept in a ranked, diversity-filtered list.
//!
//! ## Features
//!
//! - Polygons with nested holes; parts may be placed inside holes
//! - Gravity, bounding-box and convex-hull placement scoring
//! - Optional line-merge bonus for shared cut edges
//! - Process-wide NFP cache shared across generations and runs
//! - Priority parts placed before ordinary ones
//! - Part and sheet spacing
//! - JSON snapshots of results (`serde` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use sheetnest_d2::{NestConfig, Nester, NestItem, PlacementType, Polygon, Sheet};
//!
//! let config = NestConfig::new()
//!     .with_population_size(10)
//!     .with_rotations(4)
//!     .with_placement_type(PlacementType::BoundingBox)
//!     .with_parallel(false)
//!     .with_seed(42);
//!
//! let mut nester = Nester::new(config).unwrap();
//! nester
//!     .start(
//!         vec![
//!             NestItem::new(Polygon::rectangle(50.0, 30.0), 4),
//!             NestItem::new(Polygon::circle(12.0, 24), 2),
//!         ],
//!         vec![NestItem::new(Sheet::rectangle(200.0, 100.0), 1)],
//!     )
//!     .unwrap();
//! nester.run_until(Some(3), None).unwrap();
//!
//! let best = nester.best().unwrap().unwrap();
//! println!(
//!     "{} of {} parts placed, utilization {:.1}%",
//!     best.placed_count(),
//!     best.total_parts,
//!     best.material_utilization() * 100.0
//! );
//! ```
//!
//! ## Geometry
//!
//! ```rust
//! use sheetnest_d2::Polygon;
//!
//! // Frame with a square window; small parts can nest inside the window.
//! let frame = Polygon::rectangle(100.0, 100.0)
//!     .with_hole(Polygon::from_xy(&[(20.0, 20.0), (80.0, 20.0), (80.0, 80.0), (20.0, 80.0)]));
//! assert_eq!(frame.children().len(), 1);
//! assert!((frame.net_area() - 6400.0).abs() < 1e-9);
//! ```

pub mod clipper;
pub mod ga_nesting;
pub mod geometry;
pub mod merge_lines;
pub mod nester;
pub mod nfp;
pub mod nfp_cache;
pub mod part_placement;
pub mod placement_worker;
pub mod result;
#[cfg(feature = "serde")]
pub mod snapshot;

pub use clipper::{select_engine, BooleanEngine, FillType, IntPath, IntPoint, OverlayEngine};
pub use ga_nesting::{IndividualEvaluator, NestInputs};
pub use geometry::{NestItem, Polygon, Sheet};
pub use merge_lines::{merged_length, MergedLines};
pub use nester::{IterationOutcome, Nester, ResponseKind};
pub use nfp::Nfp;
pub use nfp_cache::{DbCacheKey, NfpCache, NfpCacheKey, NfpHelper, WindowCache};
pub use part_placement::{NfpCandidateList, PartPlacementWorker, PlacementFlow};
pub use placement_worker::{PlacementWorker, SheetInstance};
pub use result::{NestResult, PartPlacement, SheetFitness, SheetPlacement};
pub use sheetnest_core::{
    Bounds, Error, MinkowskiSumPick, NestConfig, NestState, PlacementType, Point, ProgressBar,
    ProgressSink, Result, StrictAngle, TopNestResults, TryAddResult,
};
