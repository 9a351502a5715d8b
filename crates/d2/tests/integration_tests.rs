//! Integration tests for sheetnest-d2.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sheetnest_d2::clipper::{path_area, polygon_to_paths};
use sheetnest_d2::{
    BooleanEngine, Error, FillType, IterationOutcome, NestConfig, NestItem, NestResult, Nester,
    OverlayEngine, PlacementType, Polygon, Sheet, TopNestResults, TryAddResult,
};
use std::time::Duration;

const CHECK_SCALE: f64 = 1000.0;

fn config() -> NestConfig {
    NestConfig::default()
        .with_population_size(8)
        .with_parallel(false)
        .with_clipper_scale(10_000.0)
        .with_seed(2024)
}

fn run(config: NestConfig, parts: Vec<NestItem<Polygon>>, sheets: Vec<NestItem<Sheet>>, generations: u32) -> Nester {
    let mut nester = Nester::new(config).unwrap();
    nester.start(parts, sheets).unwrap();
    nester.run_until(Some(generations), None).unwrap();
    nester
}

/// Area shared by two placed parts, in model units.
fn overlap_area(engine: &OverlayEngine, a: &Polygon, b: &Polygon) -> f64 {
    let pa = polygon_to_paths(a, 0.0, 0.0, CHECK_SCALE);
    let pb = polygon_to_paths(b, 0.0, 0.0, CHECK_SCALE);
    let shared = engine.intersection(&pa, &pb, FillType::NonZero).unwrap();
    shared.iter().map(|p| path_area(p)).sum::<f64>().abs() / (CHECK_SCALE * CHECK_SCALE)
}

fn assert_no_overlap(result: &NestResult) {
    let engine = OverlayEngine::new();
    for sheet in &result.sheets {
        let placed: Vec<Polygon> = sheet.placements.iter().map(|p| p.placed_polygon()).collect();
        for i in 0..placed.len() {
            for j in (i + 1)..placed.len() {
                let shared = overlap_area(&engine, &placed[i], &placed[j]);
                assert!(
                    shared < 1e-3,
                    "parts {} and {} overlap by {}",
                    sheet.placements[i].id,
                    sheet.placements[j].id,
                    shared
                );
            }
        }
    }
}

fn assert_accounted(result: &NestResult) {
    let mut ids: Vec<usize> = result
        .sheets
        .iter()
        .flat_map(|s| s.placements.iter().map(|p| p.id))
        .chain(result.unplaced.iter().map(|p| p.id()))
        .collect();
    ids.sort();
    assert_eq!(ids, (0..result.total_parts).collect::<Vec<_>>());
}

mod nesting_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_four_squares_fill_one_sheet() {
        let nester = run(
            config(),
            vec![NestItem::new(Polygon::rectangle(400.0, 400.0), 4)],
            vec![NestItem::new(Sheet::rectangle(1000.0, 1000.0), 1)],
            2,
        );
        let best = nester.best().unwrap().unwrap();

        assert!(best.unplaced.is_empty());
        assert_eq!(best.sheets.len(), 1);
        assert_eq!(best.placed_count(), 4);
        assert_relative_eq!(best.material_utilization(), 0.64, epsilon = 1e-6);
        assert_no_overlap(&best);
        assert_accounted(&best);

        for placement in &best.sheets[0].placements {
            let b = placement.placed_polygon().bounds();
            assert!(b.x >= -1e-6 && b.y >= -1e-6);
            assert!(b.max_x() <= 1000.0 + 1e-6 && b.max_y() <= 1000.0 + 1e-6);
        }
    }

    #[test]
    fn test_oversized_part_stays_unplaced() {
        let nester = run(
            config(),
            vec![
                NestItem::new(Polygon::rectangle(1200.0, 1200.0), 1),
                NestItem::new(Polygon::rectangle(100.0, 100.0), 2),
            ],
            vec![NestItem::new(Sheet::rectangle(1000.0, 1000.0), 1)],
            2,
        );
        let best = nester.best().unwrap().unwrap();

        assert_eq!(best.unplaced.len(), 1);
        assert_eq!(best.placed_count(), 2);
        assert!(best.unplaced_penalty() > 0.0);
        assert_accounted(&best);
    }

    #[test]
    fn test_part_nests_inside_frame_hole() {
        let hole = Polygon::from_xy(&[(20.0, 20.0), (80.0, 20.0), (80.0, 80.0), (20.0, 80.0)]);
        for placement_type in [PlacementType::BoundingBox, PlacementType::Gravity] {
            let nester = run(
                config().with_placement_type(placement_type),
                vec![
                    NestItem::new(Polygon::rectangle(100.0, 100.0).with_hole(hole.clone()), 1),
                    NestItem::new(Polygon::rectangle(40.0, 40.0), 1),
                ],
                vec![NestItem::new(Sheet::rectangle(120.0, 120.0), 1)],
                2,
            );
            let best = nester.best().unwrap().unwrap();
            assert!(best.unplaced.is_empty(), "{:?}: part left unplaced", placement_type);
            assert_eq!(best.sheets.len(), 1);
            assert_no_overlap(&best);

            let sheet = &best.sheets[0];
            let frame = sheet.placements.iter().find(|p| p.source == 0).unwrap();
            let small = sheet.placements.iter().find(|p| p.source == 1).unwrap();
            let window = frame.placed_polygon().children()[0].bounds();
            let inner = small.placed_polygon().bounds();
            assert!(inner.x >= window.x - 1e-6 && inner.max_x() <= window.max_x() + 1e-6);
            assert!(inner.y >= window.y - 1e-6 && inner.max_y() <= window.max_y() + 1e-6);
        }
    }

    #[test]
    fn test_parts_away_from_origin_avoid_sheet_hole() {
        let hole = Polygon::from_xy(&[(60.0, 60.0), (140.0, 60.0), (140.0, 140.0), (60.0, 140.0)]);
        let sheet = Sheet::new(Polygon::rectangle(200.0, 200.0).with_hole(hole.clone()));
        let part = Polygon::from_xy(&[(500.0, 500.0), (515.0, 500.0), (515.0, 515.0), (500.0, 515.0)]);

        for placement_type in [PlacementType::BoundingBox, PlacementType::Gravity] {
            let nester = run(
                config().with_placement_type(placement_type),
                vec![NestItem::new(part.clone(), 6)],
                vec![NestItem::new(sheet.clone(), 1)],
                2,
            );
            let best = nester.best().unwrap().unwrap();
            assert!(best.unplaced.is_empty(), "{:?}: parts left unplaced", placement_type);
            assert_no_overlap(&best);
            assert_accounted(&best);

            let engine = OverlayEngine::new();
            for placement in &best.sheets[0].placements {
                let placed = placement.placed_polygon();
                let b = placed.bounds();
                let centre = sheetnest_d2::Point::new(b.x + b.width / 2.0, b.y + b.height / 2.0);
                assert_ne!(hole.contains_point(centre), Some(true), "part {} centred in the hole", placement.id);
                assert!(overlap_area(&engine, &placed, &hole) < 1e-3, "part {} overlaps the hole", placement.id);
                assert!(b.x >= -1e-6 && b.y >= -1e-6);
                assert!(b.max_x() <= 200.0 + 1e-6 && b.max_y() <= 200.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_spacing_keeps_parts_apart() {
        let nester = run(
            config().with_spacing(10.0),
            vec![NestItem::new(Polygon::rectangle(400.0, 400.0), 4)],
            vec![NestItem::new(Sheet::rectangle(1000.0, 1000.0), 1)],
            1,
        );
        let best = nester.best().unwrap().unwrap();
        assert!(best.unplaced.is_empty());
        assert_no_overlap(&best);
        for placement in &best.sheets[0].placements {
            assert_relative_eq!(placement.part.bounds().width, 410.0, epsilon = 1e-3);
        }
        // Results report the sheet as given, not as grown for spacing.
        assert_relative_eq!(best.sheets[0].sheet.material_area(), 1_000_000.0);
    }

    #[test]
    fn test_overflow_uses_second_sheet() {
        let nester = run(
            config(),
            vec![NestItem::new(Polygon::rectangle(60.0, 60.0), 2)],
            vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 2)],
            2,
        );
        let best = nester.best().unwrap().unwrap();
        assert!(best.unplaced.is_empty());
        assert_eq!(best.sheets.len(), 2);
        assert_ne!(best.sheets[0].sheet_id(), best.sheets[1].sheet_id());
        assert_accounted(&best);
    }

    #[test]
    fn test_priority_parts_lead_first_sheet() {
        let nester = run(
            config(),
            vec![
                NestItem::new(Polygon::rectangle(30.0, 30.0), 3),
                NestItem::new(Polygon::rectangle(70.0, 70.0).with_priority(true), 1),
            ],
            vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 2)],
            2,
        );
        for result in nester.top_results().unwrap() {
            assert_eq!(result.sheets[0].placements[0].source, 1);
        }
    }

    #[test]
    fn test_parallel_evaluation() {
        let nester = run(
            config().with_parallel(true).with_population_size(12),
            vec![
                NestItem::new(Polygon::rectangle(50.0, 20.0), 4),
                NestItem::new(Polygon::from_xy(&[(0.0, 0.0), (40.0, 0.0), (0.0, 30.0)]), 4),
            ],
            vec![NestItem::new(Sheet::rectangle(150.0, 100.0), 1)],
            2,
        );
        let best = nester.best().unwrap().unwrap();
        assert!(best.is_valid());
        assert_no_overlap(&best);
        assert_eq!(nester.state().threads(), 0);
    }
}

mod ranking_tests {
    use super::*;

    #[test]
    fn test_identical_result_is_duplicate() {
        let nester = run(
            config(),
            vec![NestItem::new(Polygon::rectangle(40.0, 40.0), 2)],
            vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 1)],
            1,
        );
        let best = nester.best().unwrap().unwrap();

        let mut top = TopNestResults::new(8, 0.1).unwrap();
        assert_eq!(top.try_add(best.clone()), TryAddResult::Added);
        assert_eq!(top.try_add(best.clone()), TryAddResult::Duplicate);
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_top_results_sorted() {
        let nester = run(
            config(),
            vec![
                NestItem::new(Polygon::rectangle(50.0, 30.0), 3),
                NestItem::new(Polygon::rectangle(25.0, 25.0), 3),
            ],
            vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 2)],
            3,
        );
        let top = nester.top_results().unwrap();
        assert!(!top.is_empty());
        let capacity = TopNestResults::<NestResult>::new(8, 0.1).unwrap().max_capacity();
        assert!(top.len() <= capacity);
        for pair in top.windows(2) {
            assert!(pair[0].fitness() <= pair[1].fitness());
        }
    }
}

mod run_control_tests {
    use super::*;

    fn parts() -> Vec<NestItem<Polygon>> {
        vec![
            NestItem::new(Polygon::rectangle(45.0, 25.0), 3),
            NestItem::new(Polygon::rectangle(20.0, 35.0), 2),
        ]
    }

    fn sheets() -> Vec<NestItem<Sheet>> {
        vec![NestItem::new(Sheet::rectangle(100.0, 80.0), 2)]
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let a = run(config(), parts(), sheets(), 3);
        let b = run(config(), parts(), sheets(), 3);
        let fa: Vec<f64> = a.top_results().unwrap().iter().map(|r| r.fitness()).collect();
        let fb: Vec<f64> = b.top_results().unwrap().iter().map(|r| r.fitness()).collect();
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_cache_is_reused() {
        let mut nester = Nester::new(config()).unwrap();
        nester.start(parts(), sheets()).unwrap();
        nester.iterate().unwrap();
        assert!(nester.cache().hits() > 0);
        assert!(nester.state().nfp_cache_percent() > 0.0);

        let misses = nester.cache().misses();
        nester.reset().unwrap();
        nester.start(parts(), sheets()).unwrap();
        nester.iterate().unwrap();
        // Same seed, same genes: every NFP is already known.
        assert_eq!(nester.cache().misses(), misses);
    }

    #[test]
    fn test_stop_halts_run() {
        let mut nester = Nester::new(config()).unwrap();
        nester.start(parts(), sheets()).unwrap();
        nester.iterate().unwrap();
        let scored = nester.state().nest_count();

        nester.stop();
        assert_eq!(nester.run_until(None, None).unwrap(), IterationOutcome::Stopped);
        assert_eq!(nester.state().nest_count(), scored);
        assert!(!nester.is_errored());
    }

    #[test]
    fn test_deadline_stops_run() {
        let mut nester = Nester::new(config()).unwrap();
        nester.start(parts(), sheets()).unwrap();
        let outcome = nester
            .run_until(None, Some(std::time::Instant::now()))
            .unwrap();
        assert_eq!(outcome, IterationOutcome::Stopped);
        assert_eq!(nester.state().nest_count(), 0);
    }

    #[test]
    fn test_single_arrangement_converges() {
        let config = config()
            .with_rotations(1)
            .with_procreation_timeout(Duration::from_millis(50));
        let mut nester = Nester::new(config).unwrap();
        nester
            .start(
                vec![NestItem::new(Polygon::rectangle(10.0, 10.0), 1)],
                vec![NestItem::new(Sheet::rectangle(50.0, 50.0), 1)],
            )
            .unwrap();
        assert_eq!(
            nester.iterate().unwrap(),
            IterationOutcome::Evaluated { evaluated: 1 }
        );
        assert_eq!(nester.iterate().unwrap(), IterationOutcome::Converged);
        assert!(nester.is_stopped());
        assert!(!nester.is_errored());
        assert_eq!(nester.iterate().unwrap(), IterationOutcome::Stopped);
    }

    #[test]
    fn test_native_backend_unavailable() {
        let mut nester = Nester::new(config().with_native_minkowski(true)).unwrap();
        let err = nester.start(parts(), sheets()).unwrap_err();
        assert!(matches!(err, Error::NativeInterop(_)));
        assert!(nester.is_errored());
        assert_eq!(nester.state().nest_count(), 0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut nester = Nester::new(config()).unwrap();
        let err = nester
            .start(vec![], vec![NestItem::new(Sheet::rectangle(10.0, 10.0), 1)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));

        assert!(matches!(
            Nester::new(config().with_population_size(0)),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod population_tests {
    use super::*;
    use sheetnest_core::{Gene, Procreant};

    #[test]
    fn test_every_gene_is_a_permutation() {
        let mut nester = Nester::new(config()).unwrap();
        nester
            .start(
                vec![
                    NestItem::new(Polygon::rectangle(30.0, 20.0), 3),
                    NestItem::new(Polygon::rectangle(15.0, 15.0), 3),
                ],
                vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 1)],
            )
            .unwrap();
        for _ in 0..3 {
            nester.iterate().unwrap();
            for item in nester.population().unwrap() {
                assert!(item.gene.validate(6).is_ok());
                for c in item.gene.iter() {
                    let angle = c.rotation;
                    assert!([0.0, 90.0, 180.0, 270.0].contains(&angle));
                }
            }
        }
    }

    #[test]
    fn test_crossover_keeps_every_part() {
        let mut rng = StdRng::seed_from_u64(5);
        let nester = {
            let mut n = Nester::new(config()).unwrap();
            n.start(
                vec![NestItem::new(Polygon::rectangle(10.0, 10.0), 7)],
                vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 1)],
            )
            .unwrap();
            n
        };
        let population = nester.population().unwrap();
        let male: &Gene = &population[0].gene;
        let female: &Gene = &population[population.len() - 1].gene;
        for _ in 0..20 {
            let (son, daughter) = Procreant::mate(male, female, &mut rng);
            assert!(son.validate(7).is_ok());
            assert!(daughter.validate(7).is_ok());
        }
    }
}

#[cfg(feature = "serde")]
mod snapshot_tests {
    use super::*;
    use approx::assert_relative_eq;
    use sheetnest_d2::snapshot;

    #[test]
    fn test_best_result_round_trip() {
        let nester = run(
            config(),
            vec![NestItem::new(Polygon::rectangle(30.0, 30.0), 3)],
            vec![NestItem::new(Sheet::rectangle(100.0, 100.0), 1)],
            1,
        );
        let best = nester.best().unwrap().unwrap();
        let json = snapshot::to_json_pretty(&best).unwrap();
        let back: NestResult = snapshot::from_json(&json).unwrap();

        assert_relative_eq!(back.fitness(), best.fitness());
        assert_eq!(back.placed_count(), best.placed_count());
        assert_eq!(back.sheets[0].placements[0].id, best.sheets[0].placements[0].id);
    }
}
