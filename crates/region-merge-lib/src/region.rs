//! Region storage and the live region set
//!
//! A `Region` owns its native geometry plus the planar reprojection, bounding box and
//! area derived from it. Regions are never mutated: a merge builds a new one.

use crate::{MergeError, Projector, Result};
use geo::{BooleanOps, BoundingRect, Geometry, MultiPolygon, Polygon, Rect, Validation};

/// Opaque feature attributes, carried through merges untouched
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// One input or output record: a geometry plus its attributes
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    /// `None` for features whose geometry is missing (e.g. GeoJSON `null`)
    pub geometry: Option<Geometry<f64>>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, properties: Properties) -> Self {
        Self {
            geometry: Some(geometry),
            properties,
        }
    }
}

/// Resolve a display name: the first non-empty string among `name_keys`, else the ordinal
pub fn display_name(properties: &Properties, name_keys: &[String], ordinal: usize) -> String {
    name_keys
        .iter()
        .filter_map(|key| properties.get(key))
        .filter_map(|value| value.as_str())
        .find(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| ordinal.to_string())
}

/// A single administrative region with cached planar state
#[derive(Clone, Debug)]
pub struct Region {
    /// Geometry in the input frame
    geometry_native: MultiPolygon<f64>,
    /// Reprojection of `geometry_native` into the planar frame
    geometry_planar: MultiPolygon<f64>,
    /// Bounding box of `geometry_planar`, the spatial index key
    bounding_box_planar: Rect<f64>,
    /// Area of `geometry_planar` in km²
    area_km2: f64,
    properties: Properties,
    /// Position of the originating input feature, the last-resort display name
    ordinal: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Region {
    /// Build a region from an input feature
    ///
    /// # Errors
    /// - `InvalidGeometry` for missing, non-areal, empty, degenerate or self-intersecting geometry
    /// - `ProjectionFailure` if a coordinate is outside the projector's source frame
    pub fn from_feature(feature: Feature, ordinal: usize, projector: &Projector) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("region::from_feature");

        let geometry = feature.geometry.ok_or_else(|| {
            MergeError::InvalidGeometry(format!("feature {ordinal} has no geometry"))
        })?;
        let native = match geometry {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            Geometry::MultiPolygon(multi) => multi,
            Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
            Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
            other => {
                return Err(MergeError::InvalidGeometry(format!(
                    "feature {ordinal} is a {}, expected Polygon or MultiPolygon",
                    geometry_kind(&other)
                )));
            }
        };
        Self::from_native(native, feature.properties, ordinal, projector)
    }

    /// Build a region from an already-normalized native geometry
    pub fn from_native(
        geometry_native: MultiPolygon<f64>,
        properties: Properties,
        ordinal: usize,
        projector: &Projector,
    ) -> Result<Self> {
        validate(&geometry_native)?;
        Self::assemble(geometry_native, properties, ordinal, projector)
    }

    /// Project and measure a geometry that is already known to be well formed
    fn assemble(
        geometry_native: MultiPolygon<f64>,
        properties: Properties,
        ordinal: usize,
        projector: &Projector,
    ) -> Result<Self> {
        let geometry_planar = projector.to_planar(&geometry_native)?;
        let bounding_box_planar = geometry_planar.bounding_rect().ok_or_else(|| {
            MergeError::InvalidGeometry("geometry has no bounding box".to_string())
        })?;
        let area_km2 = projector.area_km2(&geometry_planar)?;
        if area_km2 <= 0.0 {
            return Err(MergeError::InvalidGeometry(
                "geometry encloses no area".to_string(),
            ));
        }

        Ok(Region {
            geometry_native,
            geometry_planar,
            bounding_box_planar,
            area_km2,
            properties,
            ordinal,
        })
    }

    /// Dissolve `absorbed` into `absorber`
    ///
    /// The union is taken in the native frame. The result keeps the absorber's
    /// properties and ordinal; the absorbed region's attributes are dropped.
    /// Union output is not re-validated; regions meeting at a single corner yield
    /// a ring that touches itself.
    pub fn merged(absorbed: &Region, absorber: &Region, projector: &Projector) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("region::merged");

        let union = absorber.geometry_native.union(&absorbed.geometry_native);
        if union.0.is_empty() {
            return Err(MergeError::InvalidGeometry(format!(
                "union of regions {} and {} is empty",
                absorbed.ordinal, absorber.ordinal
            )));
        }
        Self::assemble(
            union,
            absorber.properties.clone(),
            absorber.ordinal,
            projector,
        )
    }

    #[inline]
    pub fn geometry_native(&self) -> &MultiPolygon<f64> {
        &self.geometry_native
    }

    #[inline]
    pub fn geometry_planar(&self) -> &MultiPolygon<f64> {
        &self.geometry_planar
    }

    /// Bounding box of the planar geometry
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box_planar
    }

    /// Area in square kilometers, cached at construction
    #[inline]
    pub fn area_km2(&self) -> f64 {
        self.area_km2
    }

    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Display name for diagnostics, see [`display_name`]
    pub fn identity(&self, name_keys: &[String]) -> String {
        display_name(&self.properties, name_keys, self.ordinal)
    }

    /// Convert back into an output feature
    ///
    /// Single-part regions are written as a `Polygon`, others as a `MultiPolygon`.
    pub fn into_feature(self) -> Feature {
        let mut parts = self.geometry_native.0;
        let geometry = if parts.len() == 1 {
            Geometry::Polygon(parts.remove(0))
        } else {
            Geometry::MultiPolygon(MultiPolygon::new(parts))
        };
        Feature::new(geometry, self.properties)
    }
}

fn validate(geometry: &MultiPolygon<f64>) -> Result<()> {
    if geometry.0.is_empty() {
        return Err(MergeError::InvalidGeometry("geometry is empty".to_string()));
    }
    for polygon in &geometry.0 {
        validate_polygon(polygon)?;
    }
    Ok(())
}

fn validate_polygon(polygon: &Polygon<f64>) -> Result<()> {
    // A closed ring needs at least three distinct vertices plus the closing one
    if polygon.exterior().0.len() < 4 {
        return Err(MergeError::InvalidGeometry(format!(
            "exterior ring has {} coordinates, at least 4 required",
            polygon.exterior().0.len()
        )));
    }
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        if let Some(coord) = ring.0.iter().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(MergeError::InvalidGeometry(format!(
                "non-finite coordinate ({}, {})",
                coord.x, coord.y
            )));
        }
    }
    // Self-intersecting rings and misplaced holes have no meaningful area
    polygon
        .check_validation()
        .map_err(|e| MergeError::InvalidGeometry(e.to_string()))
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "areal geometry",
    }
}

/// The ordered collection of live regions
///
/// Every mutation bumps the generation, which invalidates any [`crate::SpatialIndex`]
/// built from an earlier snapshot.
#[derive(Clone, Debug, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    generation: u64,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions,
            generation: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// Snapshot stamp, changes on every mutation
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Remove the regions at `a` and `b` and append `merged`
    ///
    /// The relative order of the remaining regions is preserved.
    pub fn replace_pair(&mut self, a: usize, b: usize, merged: Region) -> Result<()> {
        let len = self.regions.len();
        if a == b || a >= len || b >= len {
            return Err(MergeError::InvalidPair { a, b, len });
        }
        // Remove the higher position first so the lower one stays valid
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        self.regions.remove(high);
        self.regions.remove(low);
        self.regions.push(merged);
        self.generation += 1;
        Ok(())
    }

    pub fn into_regions(self) -> Vec<Region> {
        self.regions
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
