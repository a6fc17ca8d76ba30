//! Region Merge Library - Iterative Dissolution of Small Regions
//!
//! This library takes a set of polygonal administrative regions and repeatedly merges the
//! globally smallest region below an area threshold into its smallest true neighbor (or,
//! for islands, into the smallest region ranked by centroid distance) until every region
//! meets the threshold.
//!
//! # Architecture
//!
//! - **[`Projector`]**: Geographic to planar coordinate transform used for area measurement
//! - **[`Region`]** / **[`RegionSet`]**: Immutable regions with cached planar geometry and area
//! - **[`SpatialIndex`]**: Bulk-loaded R*-tree over planar bounding boxes, bound to one snapshot
//! - **[`neighbor`]**: True-neighbor detection and nearest-centroid fallback
//! - **[`MergeEngine`]**: The SCANNING → MERGING → REBUILDING loop
//!
//! # Performance Characteristics
//!
//! - **Load**: O(N) projection and area work, parallelized across features
//! - **Merge step**: O(N) scan + O(log N + K) index query + one polygon union
//! - **Rebuild**: O(N log N) bulk load after every merge

mod engine;
mod index;
pub mod neighbor;
pub mod projection;
mod region;

// Public API exports
pub use engine::{DoneReason, LoadReport, MergeConfig, MergeEngine, MergeStep, MergeSummary, StepOutcome};
pub use index::SpatialIndex;
pub use neighbor::{NeighborKind, Partner};
pub use projection::{Crs, Projector};
pub use region::{Feature, Properties, Region, RegionSet, display_name};

/// Error types for loading and merging regions
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Projection failure: {0}")]
    ProjectionFailure(String),

    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("Spatial index is stale: built for generation {index_generation}, region set is at {set_generation}")]
    IndexStale {
        index_generation: u64,
        set_generation: u64,
    },

    #[error("Cannot replace regions {a} and {b} in a set of {len}")]
    InvalidPair { a: usize, b: usize, len: usize },

    #[error("No merge target available")]
    NoMergeTarget,

    #[error("No valid features to process ({skipped} skipped)")]
    EmptyInput { skipped: usize },
}

pub type Result<T> = std::result::Result<T, MergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn(MergeConfig) -> Result<MergeEngine> = MergeEngine::new;
        let _: fn() -> MergeConfig = MergeConfig::default;
        let _: fn(&RegionSet) -> SpatialIndex = SpatialIndex::build;
    }

    #[test]
    fn test_error_messages() {
        let err = MergeError::IndexStale {
            index_generation: 1,
            set_generation: 2,
        };
        assert_eq!(
            err.to_string(),
            "Spatial index is stale: built for generation 1, region set is at 2"
        );
        assert_eq!(
            MergeError::EmptyInput { skipped: 3 }.to_string(),
            "No valid features to process (3 skipped)"
        );
    }
}
