//! Bounding-box spatial index over one region set snapshot
//!
//! The index is an R*-tree bulk-loaded from the planar bounding boxes of every region.
//! It never changes after construction: any change to the region set requires a rebuild,
//! and queries against a newer snapshot fail with [`MergeError::IndexStale`].

use crate::{MergeError, RegionSet, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

/// A planar bounding box tagged with the region's position in the set
type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Immutable bounding-box index bound to a [`RegionSet`] generation
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexedEnvelope>,
    /// Generation of the region set this index was built from
    generation: u64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Bulk-load an index over the planar bounding boxes of `regions`
    pub fn build(regions: &RegionSet) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let entries: Vec<IndexedEnvelope> = regions
            .iter()
            .enumerate()
            .map(|(id, region)| GeomWithData::new(rect_to_rectangle(region.bounding_box()), id))
            .collect();

        tracing::debug!(
            "Built spatial index over {} regions (generation {})",
            entries.len(),
            regions.generation()
        );

        Self {
            tree: RTree::bulk_load(entries),
            generation: regions.generation(),
        }
    }

    /// Generation of the region set snapshot this index covers
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of indexed bounding boxes
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Identifiers whose bounding box intersects the bounding box of `geometry`
    ///
    /// This is a candidate set only, bounding-box overlap does not prove adjacency.
    /// Results are sorted in region set order. Touching boxes count as intersecting.
    pub fn query(&self, regions: &RegionSet, geometry: &MultiPolygon<f64>) -> Result<Vec<usize>> {
        match geometry.bounding_rect() {
            Some(rect) => self.query_rect(regions, rect),
            None => {
                self.ensure_fresh(regions)?;
                Ok(Vec::new())
            }
        }
    }

    /// Identifiers whose bounding box intersects `rect`, in region set order
    pub fn query_rect(&self, regions: &RegionSet, rect: Rect<f64>) -> Result<Vec<usize>> {
        self.ensure_fresh(regions)?;

        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect();
        hits.sort_unstable();
        Ok(hits)
    }

    fn ensure_fresh(&self, regions: &RegionSet) -> Result<()> {
        if self.generation != regions.generation() {
            return Err(MergeError::IndexStale {
                index_generation: self.generation,
                set_generation: regions.generation(),
            });
        }
        Ok(())
    }
}

#[inline]
fn rect_to_rectangle(rect: Rect<f64>) -> Rectangle<[f64; 2]> {
    Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}
