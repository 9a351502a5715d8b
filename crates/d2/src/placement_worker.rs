//! Sheet-level placement loop.
//!
//! Sheets are taken from a stack in input order. Each pass offers every
//! unplaced part to the current sheet; priority parts go first while any
//! remain. A sheet left with unplaced parts after a priority pass goes back
//! on the stack and is reopened for ordinary filling once no priority part is
//! left anywhere.

use crate::geometry::{Polygon, Sheet};
use crate::nfp_cache::NfpHelper;
use crate::part_placement::{NfpCandidateList, PartPlacementWorker, PlacementFlow};
use crate::result::{NestResult, PartPlacement, SheetPlacement};
use sheetnest_core::progress::{ProgressBar, ProgressSink};
use sheetnest_core::{Error, NestConfig, Result};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One sheet instance: the outline parts are fitted into (after spacing) and
/// the outline reported in results.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetInstance {
    pub working: Sheet,
    pub original: Sheet,
}

impl SheetInstance {
    pub fn new(working: Sheet, original: Sheet) -> Self {
        Self { working, original }
    }
}

impl From<Sheet> for SheetInstance {
    fn from(sheet: Sheet) -> Self {
        Self::new(sheet.clone(), sheet)
    }
}

struct OpenSheet {
    index: usize,
    placements: Vec<PartPlacement>,
    merged_length: f64,
}

/// Places one decoded gene across the available sheets.
pub struct PlacementWorker<'w, 'a> {
    config: &'w NestConfig,
    helper: &'w NfpHelper<'a>,
    sheets: &'w [SheetInstance],
    progress: &'w dyn ProgressSink,
    last_candidates: Option<NfpCandidateList>,
}

impl<'w, 'a> PlacementWorker<'w, 'a> {
    pub fn new(
        config: &'w NestConfig,
        helper: &'w NfpHelper<'a>,
        sheets: &'w [SheetInstance],
        progress: &'w dyn ProgressSink,
    ) -> Self {
        Self {
            config,
            helper,
            sheets,
            progress,
            last_candidates: None,
        }
    }

    /// Candidate region of the last part placed by [`place_parts`](Self::place_parts).
    pub fn last_candidates(&self) -> Option<&NfpCandidateList> {
        self.last_candidates.as_ref()
    }

    /// Places `parts` (rotated, in gene order) and scores the outcome.
    ///
    /// Fails with [`Error::InvariantViolation`] when part ids repeat or the
    /// bookkeeping of placed and unplaced parts goes out of step.
    pub fn place_parts(&mut self, parts: Vec<Polygon>) -> Result<NestResult> {
        let total_parts = parts.len();
        let mut ids = HashSet::with_capacity(total_parts);
        if let Some(dup) = parts.iter().find(|p| !ids.insert(p.id())) {
            return Err(Error::InvariantViolation(format!(
                "part id {} appears twice in one nest",
                dup.id()
            )));
        }

        let mut unplaced = parts;
        let mut stack: Vec<usize> = (0..self.sheets.len()).rev().collect();
        let mut used: Vec<OpenSheet> = Vec::new();
        self.progress.init_loop(ProgressBar::Secondary, total_parts);

        while !unplaced.is_empty() {
            let Some(open) = self.take_sheet(&mut stack, &mut used, &unplaced) else {
                break;
            };
            let priority_pass =
                self.config.use_priority && unplaced.iter().any(|p| p.is_priority());
            let order: Vec<Polygon> = if priority_pass {
                let (mut first, rest): (Vec<Polygon>, Vec<Polygon>) =
                    unplaced.iter().cloned().partition(|p| p.is_priority());
                first.extend(rest);
                first
            } else {
                unplaced.clone()
            };

            let sheets = self.sheets;
            let sheet = &sheets[open.index];
            let mut worker =
                PartPlacementWorker::new(self.config, self.helper, &sheet.working, open.placements);
            for part in &order {
                match worker.process_part(part)? {
                    PlacementFlow::Placed => {
                        let position = unplaced
                            .iter()
                            .position(|p| p.id() == part.id())
                            .ok_or_else(|| {
                                Error::InvariantViolation(format!(
                                    "placed part {} is missing from the unplaced list",
                                    part.id()
                                ))
                            })?;
                        unplaced.remove(position);
                        self.progress.increment_loop(ProgressBar::Secondary);
                    }
                    PlacementFlow::Continue => continue,
                    PlacementFlow::Break => break,
                }
            }

            if priority_pass && !unplaced.is_empty() {
                stack.push(open.index);
            }
            if let Some(candidates) = worker.final_nfp() {
                self.last_candidates = Some(candidates.clone());
            }
            let merged_length = worker.merged_length();
            let placements = worker.into_placements();
            if placements.is_empty() {
                log::debug!(
                    "Sheet {} took no parts; {} left unplaced",
                    sheet.working.id(),
                    unplaced.len()
                );
                break;
            }
            used.push(OpenSheet {
                index: open.index,
                placements,
                merged_length,
            });
        }

        let sheet_placements: Vec<SheetPlacement> = used
            .into_iter()
            .map(|open| {
                SheetPlacement::new(
                    self.sheets[open.index].original.clone(),
                    self.config.placement_type,
                    open.placements,
                    open.merged_length,
                    self.config.gravity_width_weight,
                )
            })
            .collect();
        let offered: f64 = self.sheets.iter().map(|s| s.original.material_area()).sum();

        let result = NestResult::new(
            total_parts,
            self.config.placement_type,
            sheet_placements,
            unplaced,
            offered,
        );
        debug_assert!(result.is_valid(), "invalid nest generated");
        Ok(result)
    }

    /// Pops the next usable sheet. A sheet that already holds parts is held
    /// back while priority parts remain and reopened otherwise.
    fn take_sheet(
        &self,
        stack: &mut Vec<usize>,
        used: &mut Vec<OpenSheet>,
        unplaced: &[Polygon],
    ) -> Option<OpenSheet> {
        let mut requeue = Vec::new();
        let mut taken = None;
        while let Some(index) = stack.pop() {
            match used.iter().position(|u| u.index == index) {
                Some(slot) => {
                    if self.config.use_priority && unplaced.iter().any(|p| p.is_priority()) {
                        requeue.push(index);
                        continue;
                    }
                    taken = Some(used.remove(slot));
                    break;
                }
                None => {
                    taken = Some(OpenSheet {
                        index,
                        placements: Vec::new(),
                        merged_length: 0.0,
                    });
                    break;
                }
            }
        }
        stack.extend(requeue);
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipper::OverlayEngine;
    use crate::nfp_cache::{NfpCache, WindowCache};
    use approx::assert_relative_eq;
    use sheetnest_core::progress::NullProgress;

    fn config() -> NestConfig {
        NestConfig::default().with_clipper_scale(10_000.0)
    }

    fn square(id: usize, size: f64) -> Polygon {
        Polygon::rectangle(size, size).with_id(id).with_source(id)
    }

    fn sheets(count: usize, size: f64) -> Vec<SheetInstance> {
        (0..count)
            .map(|i| SheetInstance::from(Sheet::rectangle(size, size).with_id(100 + i)))
            .collect()
    }

    #[test]
    fn test_fills_sheets_in_order() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let sheets = sheets(2, 100.0);

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        let parts = (0..3).map(|i| square(i, 60.0)).collect();
        let result = worker.place_parts(parts).unwrap();

        assert!(result.is_valid());
        assert_eq!(result.sheets.len(), 2);
        assert_eq!(result.sheets[0].sheet_id(), 100);
        assert_eq!(result.sheets[0].placements.len(), 1);
        assert_eq!(result.sheets[1].placements.len(), 1);
        assert_eq!(result.unplaced.len(), 1);
        assert!(worker.last_candidates().is_some());
    }

    #[test]
    fn test_oversized_part_is_unplaced() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let sheets = sheets(1, 100.0);

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        let result = worker
            .place_parts(vec![square(0, 150.0), square(1, 20.0)])
            .unwrap();
        assert_eq!(result.placed_count(), 1);
        assert_eq!(result.unplaced.len(), 1);
        assert_eq!(result.unplaced[0].id(), 0);
        assert_eq!(result.placed_count() + result.unplaced.len(), result.total_parts);
    }

    #[test]
    fn test_priority_parts_placed_first() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let sheets = sheets(2, 100.0);

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        let parts = vec![
            square(0, 70.0),
            square(1, 70.0).with_priority(true),
            square(2, 20.0),
        ];
        let result = worker.place_parts(parts).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.sheets[0].placements[0].id, 1);
        assert!(result.sheets.iter().all(|s| !s.placements.is_empty()));
        assert!(result.unplaced.is_empty());
    }

    #[test]
    fn test_sheet_reopened_after_priority_pass() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let sheets = sheets(2, 100.0);

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        // Two priority parts that cannot share a sheet, plus filler.
        let parts = vec![
            square(0, 70.0).with_priority(true),
            square(1, 70.0).with_priority(true),
            square(2, 25.0),
            square(3, 25.0),
        ];
        let result = worker.place_parts(parts).unwrap();
        assert!(result.is_valid());
        assert!(result.unplaced.is_empty());
        assert_eq!(result.sheets.len(), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let sheets = sheets(1, 100.0);

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        let err = worker
            .place_parts(vec![square(0, 10.0), square(0, 10.0)])
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_result_uses_original_sheet() {
        let engine = OverlayEngine::new();
        let (cache, window) = (NfpCache::new(), WindowCache::new());
        let config = config();
        let helper = NfpHelper::new(&engine, &cache, &window, &config);
        let working = Sheet::new(Polygon::from_xy(&[(5.0, 5.0), (95.0, 5.0), (95.0, 95.0), (5.0, 95.0)]));
        let sheets = vec![SheetInstance::new(working, Sheet::rectangle(100.0, 100.0))];

        let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
        let result = worker.place_parts(vec![square(0, 50.0)]).unwrap();
        assert_relative_eq!(result.sheets[0].sheet.material_area(), 10_000.0);
        assert_relative_eq!(result.sheets[0].placements[0].x, 5.0, epsilon = 1e-6);
    }
}
