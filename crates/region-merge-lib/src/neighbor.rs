//! Merge partner selection
//!
//! A partner is the smallest true neighbor of the target: a region whose native geometry
//! actually intersects the target's, not merely its bounding box. Regions with no true
//! neighbor (islands) fall back to every other region, ranked by centroid distance.

use crate::{MergeError, RegionSet, Result, SpatialIndex};
use geo::line_measures::Distance;
use geo::{Centroid, Euclidean, Intersects};
use rayon::prelude::*;

/// How a partner was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NeighborKind {
    /// Geometries intersect
    Adjacent,
    /// No region touches the target; chosen from the centroid-distance ranking
    Nearest,
}

/// The region selected to absorb the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partner {
    /// Position of the partner in the region set
    pub index: usize,
    pub kind: NeighborKind,
}

/// Regions whose native geometry intersects the target's, in region set order
pub fn true_neighbors(target: usize, index: &SpatialIndex, regions: &RegionSet) -> Result<Vec<usize>> {
    let region = regions.get(target).ok_or(MergeError::NoMergeTarget)?;
    let candidates = index.query(regions, region.geometry_planar())?;

    Ok(candidates
        .into_iter()
        .filter(|&candidate| candidate != target)
        .filter(|&candidate| {
            regions
                .get(candidate)
                .is_some_and(|other| region.geometry_native().intersects(other.geometry_native()))
        })
        .collect())
}

/// Every other region, ordered by ascending distance between native centroids
///
/// The sort is stable, so equal distances keep region set order. Regions without a
/// centroid rank last.
pub fn rank_by_centroid_distance(target: usize, regions: &RegionSet) -> Vec<usize> {
    let origin = regions
        .get(target)
        .and_then(|region| region.geometry_native().centroid());

    let mut ranked: Vec<(usize, f64)> = regions
        .iter()
        .enumerate()
        .filter(|(candidate, _)| *candidate != target)
        .map(|(candidate, other)| {
            let distance = match (origin, other.geometry_native().centroid()) {
                (Some(a), Some(b)) => Euclidean.distance(a, b),
                _ => f64::INFINITY,
            };
            (candidate, distance)
        })
        .collect();

    ranked.sort_by(|(_, a), (_, b)| a.total_cmp(b));
    ranked.into_iter().map(|(candidate, _)| candidate).collect()
}

/// Select the region that should absorb `target`
///
/// The smallest-area region of the neighbor set wins; on equal areas the one met first
/// in the neighbor set (region set order, or distance order for the fallback) wins.
///
/// # Errors
/// - `NoMergeTarget` when the set holds fewer than two regions
/// - `IndexStale` when `index` was built from an older snapshot
pub fn find_partner(target: usize, index: &SpatialIndex, regions: &RegionSet) -> Result<Partner> {
    if regions.len() < 2 || target >= regions.len() {
        return Err(MergeError::NoMergeTarget);
    }

    let adjacent = true_neighbors(target, index, regions)?;
    let (neighbor_set, kind) = if adjacent.is_empty() {
        (rank_by_centroid_distance(target, regions), NeighborKind::Nearest)
    } else {
        (adjacent, NeighborKind::Adjacent)
    };

    smallest_by_area(&neighbor_set, regions)
        .map(|index| Partner { index, kind })
        .ok_or(MergeError::NoMergeTarget)
}

/// First entry of `candidates` with the minimum area
fn smallest_by_area(candidates: &[usize], regions: &RegionSet) -> Option<usize> {
    candidates
        .iter()
        .filter_map(|&candidate| regions.get(candidate).map(|r| (candidate, r.area_km2())))
        // `min_by` keeps the first of several equal minimums
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(candidate, _)| candidate)
}

/// True neighbors of every region, computed in parallel
///
/// Entry `i` lists the neighbors of region `i` in region set order.
pub fn adjacency(index: &SpatialIndex, regions: &RegionSet) -> Result<Vec<Vec<usize>>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("neighbor::adjacency");

    (0..regions.len())
        .into_par_iter()
        .map(|target| true_neighbors(target, index, regions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Crs, Projector, Properties, Region};
    use geo::{MultiPolygon, polygon};

    fn planar_projector() -> Projector {
        Projector::new(Crs::WebMercator, Crs::WebMercator).unwrap()
    }

    fn rect(x0: f64, y0: f64, width: f64, height: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + width, y: y0),
            (x: x0 + width, y: y0 + height),
            (x: x0, y: y0 + height),
        ]])
    }

    fn region_set(shapes: Vec<MultiPolygon<f64>>) -> RegionSet {
        let projector = planar_projector();
        RegionSet::new(
            shapes
                .into_iter()
                .enumerate()
                .map(|(i, shape)| Region::from_native(shape, Properties::new(), i, &projector).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_single_region_has_no_target() {
        let regions = region_set(vec![rect(0.0, 0.0, 1000.0, 1000.0)]);
        let index = SpatialIndex::build(&regions);
        assert!(matches!(
            find_partner(0, &index, &regions),
            Err(MergeError::NoMergeTarget)
        ));
    }

    #[test]
    fn test_smallest_adjacent_neighbor_wins() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),      // target
            rect(1000.0, 0.0, 3000.0, 1000.0),   // east, 3 km²
            rect(0.0, 1000.0, 1000.0, 2000.0),   // north, 2 km²
            rect(-5000.0, 0.0, 1000.0, 1000.0),  // far away, 1 km²
        ]);
        let index = SpatialIndex::build(&regions);

        let partner = find_partner(0, &index, &regions).unwrap();
        assert_eq!(
            partner,
            Partner {
                index: 2,
                kind: NeighborKind::Adjacent
            }
        );
    }

    #[test]
    fn test_bounding_box_only_candidate_is_rejected() {
        // The L-shape's box covers the target, but the geometries never meet
        let l_shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10000.0, y: 0.0),
            (x: 10000.0, y: 1000.0),
            (x: 1000.0, y: 1000.0),
            (x: 1000.0, y: 10000.0),
            (x: 0.0, y: 10000.0),
        ]]);
        let regions = region_set(vec![
            rect(5000.0, 5000.0, 1000.0, 1000.0), // target
            l_shape,                              // large, box overlaps only
            rect(6000.0, 5000.0, 2000.0, 2000.0), // touches the target, 4 km²
        ]);
        let index = SpatialIndex::build(&regions);

        let candidates = index
            .query(&regions, regions.get(0).unwrap().geometry_planar())
            .unwrap();
        assert_eq!(candidates, vec![0, 1, 2]);

        assert_eq!(true_neighbors(0, &index, &regions).unwrap(), vec![2]);
        let partner = find_partner(0, &index, &regions).unwrap();
        assert_eq!(partner.index, 2);
        assert_eq!(partner.kind, NeighborKind::Adjacent);
    }

    #[test]
    fn test_rank_by_centroid_distance() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),       // target, centroid (500, 500)
            rect(20000.0, 0.0, 1000.0, 1000.0),   // 20 km
            rect(5000.0, 0.0, 1000.0, 1000.0),    // 5 km
            rect(0.0, -10000.0, 1000.0, 1000.0),  // 10 km
        ]);
        assert_eq!(rank_by_centroid_distance(0, &regions), vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_ties_keep_set_order() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),
            rect(5000.0, 0.0, 1000.0, 1000.0),
            rect(-5000.0, 0.0, 1000.0, 1000.0),
        ]);
        assert_eq!(rank_by_centroid_distance(0, &regions), vec![1, 2]);
    }

    #[test]
    fn test_island_falls_back_to_smallest_overall() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),        // isolated target
            rect(3000.0, 0.0, 1000.0, 4000.0),     // nearest, 4 km²
            rect(50000.0, 0.0, 1000.0, 2000.0),    // farthest, 2 km²
            rect(20000.0, 0.0, 1000.0, 3000.0),    // 3 km²
        ]);
        let index = SpatialIndex::build(&regions);

        assert!(true_neighbors(0, &index, &regions).unwrap().is_empty());
        let partner = find_partner(0, &index, &regions).unwrap();
        assert_eq!(
            partner,
            Partner {
                index: 2,
                kind: NeighborKind::Nearest
            }
        );
    }

    #[test]
    fn test_fallback_area_tie_prefers_nearest() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),
            rect(30000.0, 0.0, 2000.0, 1000.0),
            rect(10000.0, 0.0, 2000.0, 1000.0),
        ]);
        let index = SpatialIndex::build(&regions);
        assert_eq!(find_partner(0, &index, &regions).unwrap().index, 2);
    }

    #[test]
    fn test_adjacent_area_tie_prefers_set_order() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),
            rect(1000.0, 0.0, 1000.0, 1000.0),
            rect(-1000.0, 0.0, 1000.0, 1000.0),
        ]);
        let index = SpatialIndex::build(&regions);
        assert_eq!(find_partner(0, &index, &regions).unwrap().index, 1);
    }

    #[test]
    fn test_adjacency() {
        let regions = region_set(vec![
            rect(0.0, 0.0, 1000.0, 1000.0),
            rect(1000.0, 0.0, 1000.0, 1000.0),
            rect(2000.0, 0.0, 1000.0, 1000.0),
            rect(9000.0, 0.0, 1000.0, 1000.0),
        ]);
        let index = SpatialIndex::build(&regions);
        let adjacency = adjacency(&index, &regions).unwrap();
        assert_eq!(adjacency, vec![vec![1], vec![0, 2], vec![1], vec![]]);
    }
}
