//! MergeEngine - Iterative dissolution of sub-threshold regions
//!
//! This module owns the loop state (region set, spatial index, merge counter) as one
//! explicit context object and drives the state machine:
//!
//! ```text
//! SCANNING → MERGING → REBUILDING → SCANNING … → DONE
//! ```
//!
//! Each [`MergeEngine::step`] performs one full transition, so the engine can be
//! inspected between merges and any interruption leaves a fully formed region set.

use crate::neighbor::{self, NeighborKind};
use crate::{Crs, Feature, MergeError, Projector, Region, RegionSet, Result, SpatialIndex};

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the merge engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeConfig {
    /// Regions with an area strictly below this value (km²) are merged away.
    /// Default: 50000
    pub threshold_km2: f64,
    /// Frame of the input coordinates. Default: EPSG:4326
    pub source_crs: Crs,
    /// Planar frame areas are measured in. Default: EPSG:3857
    pub target_crs: Crs,
    /// Property keys tried in order to name a region in diagnostics.
    /// The input ordinal is used when none holds a non-empty string.
    /// Default: `["name", "name_en"]`
    pub name_keys: Vec<String>,
    /// Stop after this many merges, even if regions remain below threshold
    pub max_merges: Option<usize>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            threshold_km2: 50_000.0,
            source_crs: Crs::Wgs84,
            target_crs: Crs::WebMercator,
            name_keys: vec!["name".to_string(), "name_en".to_string()],
            max_merges: None,
        }
    }
}

/// Outcome of loading input features
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoadReport {
    /// Features turned into regions
    pub loaded: usize,
    /// Features dropped because of invalid geometry
    pub skipped: usize,
}

/// Record of one completed merge
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeStep {
    /// 1-based merge number
    pub step: usize,
    /// Identity of the region that disappeared
    pub absorbed: String,
    pub absorbed_area_km2: f64,
    /// Identity of the region whose properties survive
    pub absorber: String,
    pub absorber_area_km2: f64,
    /// Area of the resulting region
    pub merged_area_km2: f64,
    pub kind: NeighborKind,
}

/// Why the engine reached DONE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DoneReason {
    /// Every region meets the threshold
    NoRegionBelowThreshold,
    /// A region is below threshold but nothing is left to merge it with
    NoMergeTarget,
    /// `max_merges` was reached
    MergeLimitReached,
}

/// Result of a single [`MergeEngine::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Merged(MergeStep),
    Done(DoneReason),
}

/// Final statistics of a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeSummary {
    pub merges: usize,
    pub final_regions: usize,
    pub reason: DoneReason,
}

/// Loop context: the live regions plus the index over their current snapshot
#[derive(Debug, Clone)]
pub struct MergeEngine {
    config: MergeConfig,
    projector: Projector,
    regions: RegionSet,
    index: SpatialIndex,
    merges: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MergeEngine {
    /// Create an engine with no regions
    pub fn new(config: MergeConfig) -> Result<Self> {
        Self::from_regions(config, Vec::new())
    }

    /// Create an engine over already-built regions, kept in the given order
    pub fn from_regions(config: MergeConfig, regions: Vec<Region>) -> Result<Self> {
        let projector = Projector::new(config.source_crs, config.target_crs)?;
        let regions = RegionSet::new(regions);
        let index = SpatialIndex::build(&regions);
        Ok(Self {
            config,
            projector,
            regions,
            index,
            merges: 0,
        })
    }

    /// Build regions from input features and create an engine over them
    ///
    /// Validation, projection and area computation run in parallel; the resulting
    /// region set keeps input order. Features with invalid geometry are skipped and
    /// counted, any projection failure aborts the load.
    ///
    /// # Errors
    /// - `ProjectionFailure` if any coordinate is outside the source frame
    /// - `EmptyInput` if no feature produced a region
    pub fn load(config: MergeConfig, features: Vec<Feature>) -> Result<(Self, LoadReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::load");

        let projector = Projector::new(config.source_crs, config.target_crs)?;

        let results: Vec<Result<Region>> = features
            .into_par_iter()
            .enumerate()
            .map(|(ordinal, feature)| Region::from_feature(feature, ordinal, &projector))
            .collect();

        let mut regions = Vec::with_capacity(results.len());
        let mut report = LoadReport::default();
        for (ordinal, result) in results.into_iter().enumerate() {
            match result {
                Ok(region) => {
                    regions.push(region);
                    report.loaded += 1;
                }
                Err(MergeError::InvalidGeometry(reason)) => {
                    tracing::warn!("Skipping feature {}: {}", ordinal, reason);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if regions.is_empty() {
            return Err(MergeError::EmptyInput {
                skipped: report.skipped,
            });
        }

        tracing::info!(
            "Loaded {} regions ({} skipped), areas measured in {}",
            report.loaded,
            report.skipped,
            projector.target()
        );

        Ok((Self::from_regions(config, regions)?, report))
    }

    #[inline]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    #[inline]
    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    #[inline]
    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Index over the current snapshot, always fresh between steps
    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Number of merges performed so far
    #[inline]
    pub fn merge_count(&self) -> usize {
        self.merges
    }

    /// SCANNING: the globally smallest region below threshold, first in set order on ties
    pub fn smallest_below_threshold(&self) -> Option<usize> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, region)| (i, region.area_km2()))
            .filter(|(_, area)| *area < self.config.threshold_km2)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }

    /// Perform one SCANNING → MERGING → REBUILDING transition
    ///
    /// Returns [`StepOutcome::Done`] without touching the region set when the loop is
    /// finished. A merge either completes fully or the error is returned with the
    /// region set unchanged.
    pub fn step(&mut self) -> Result<StepOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::step");

        if let Some(max_merges) = self.config.max_merges {
            if self.merges >= max_merges {
                return Ok(StepOutcome::Done(DoneReason::MergeLimitReached));
            }
        }

        // SCANNING
        let Some(tiny) = self.smallest_below_threshold() else {
            return Ok(StepOutcome::Done(DoneReason::NoRegionBelowThreshold));
        };

        // MERGING
        let partner = match neighbor::find_partner(tiny, &self.index, &self.regions) {
            Ok(partner) => partner,
            Err(MergeError::NoMergeTarget) => {
                tracing::debug!("Region {} has no merge target, stopping", tiny);
                return Ok(StepOutcome::Done(DoneReason::NoMergeTarget));
            }
            Err(e) => return Err(e),
        };

        let (absorbed, absorber) = match (self.regions.get(tiny), self.regions.get(partner.index)) {
            (Some(absorbed), Some(absorber)) => (absorbed, absorber),
            _ => return Err(MergeError::NoMergeTarget),
        };
        let merged = Region::merged(absorbed, absorber, &self.projector)?;

        let record = MergeStep {
            step: self.merges + 1,
            absorbed: absorbed.identity(&self.config.name_keys),
            absorbed_area_km2: absorbed.area_km2(),
            absorber: absorber.identity(&self.config.name_keys),
            absorber_area_km2: absorber.area_km2(),
            merged_area_km2: merged.area_km2(),
            kind: partner.kind,
        };

        tracing::info!(
            "Merge {}: '{}' ({:.1} km²) -> '{}' ({:.1} km²){}",
            record.step,
            record.absorbed,
            record.absorbed_area_km2,
            record.absorber,
            record.absorber_area_km2,
            match record.kind {
                NeighborKind::Adjacent => "",
                NeighborKind::Nearest => " [nearest, no shared border]",
            }
        );

        self.regions.replace_pair(tiny, partner.index, merged)?;

        // REBUILDING
        self.index = SpatialIndex::build(&self.regions);
        self.merges += 1;

        Ok(StepOutcome::Merged(record))
    }

    /// Run steps until DONE
    pub fn run(&mut self) -> Result<MergeSummary> {
        self.run_with_steps().map(|(summary, _)| summary)
    }

    /// Run steps until DONE, collecting every merge record
    pub fn run_with_steps(&mut self) -> Result<(MergeSummary, Vec<MergeStep>)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::run");

        let mut steps = Vec::new();
        loop {
            match self.step()? {
                StepOutcome::Merged(record) => steps.push(record),
                StepOutcome::Done(reason) => {
                    let summary = MergeSummary {
                        merges: self.merges,
                        final_regions: self.regions.len(),
                        reason,
                    };
                    tracing::info!(
                        "Done: {} merges, {} final regions (threshold {} km²)",
                        summary.merges,
                        summary.final_regions,
                        self.config.threshold_km2
                    );
                    return Ok((summary, steps));
                }
            }
        }
    }

    /// Consume the engine, returning the live region set
    pub fn into_regions(self) -> RegionSet {
        self.regions
    }

    /// Consume the engine, returning the live regions as output features
    pub fn into_features(self) -> Vec<Feature> {
        self.regions
            .into_regions()
            .into_iter()
            .map(Region::into_feature)
            .collect()
    }
}
