//! Subcommand implementations

use crate::error::{CliError, Result};
use crate::geojson;
use crate::settings::{AreaArgs, Command, MergeArgs, NeighborsArgs};
use region_merge_lib::{
    Feature, LoadReport, MergeEngine, MergeError, MergeStep, MergeSummary, Projector, Properties,
    Region, neighbor,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// JSON document written by `merge --report`
#[derive(Debug, Serialize)]
struct MergeReport<'a> {
    threshold_km2: f64,
    load: &'a LoadReport,
    summary: &'a MergeSummary,
    steps: &'a [MergeStep],
}

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Merge(args) => merge(&args),
        Command::Neighbors(args) => neighbors(&args),
        Command::Area(args) => area(&args),
    }
}

#[profiling::function]
fn merge(args: &MergeArgs) -> Result<()> {
    let config = args.merge_config();
    let threshold_km2 = config.threshold_km2;

    let features = geojson::read_features(&args.regions.input)?;
    tracing::info!(
        "Read {} features from {}",
        features.len(),
        args.regions.input.display()
    );

    let (mut engine, load) = MergeEngine::load(config, features)?;
    let (summary, steps) = engine.run_with_steps()?;

    if let Some(path) = &args.report {
        let report = MergeReport {
            threshold_km2,
            load: &load,
            summary: &summary,
            steps: &steps,
        };
        geojson::write_json(path, &report)?;
        tracing::info!("Report written to {}", path.display());
    }

    geojson::write_features(&args.regions.output, &engine.into_features())?;
    tracing::info!(
        "✓ {} written: {} regions after {} merges",
        args.regions.output.display(),
        summary.final_regions,
        summary.merges
    );
    Ok(())
}

#[profiling::function]
fn neighbors(args: &NeighborsArgs) -> Result<()> {
    let config = args.regions.merge_config(args.target_crs);
    let features = geojson::read_features(&args.regions.input)?;
    let (engine, _) = MergeEngine::load(config, features)?;

    let regions = engine.regions();
    let name_keys = &engine.config().name_keys;
    let adjacency = neighbor::adjacency(engine.index(), regions)?;

    let mut output = Map::new();
    for (region, neighbors) in regions.iter().zip(&adjacency) {
        let name = region.identity(name_keys);
        let names: Vec<Value> = neighbors
            .iter()
            .filter_map(|&i| regions.get(i))
            .map(|other| Value::String(other.identity(name_keys)))
            .collect();
        tracing::debug!("'{}' has {} neighbors", name, names.len());
        if output.insert(name.clone(), Value::Array(names)).is_some() {
            tracing::warn!("Duplicate region name '{}', keeping the last entry", name);
        }
    }

    geojson::write_json(&args.regions.output, &Value::Object(output))?;
    tracing::info!(
        "✓ Neighbors of {} regions written to {}",
        regions.len(),
        args.regions.output.display()
    );
    Ok(())
}

/// Annotate features in place so geometry and properties pass through untouched
#[profiling::function]
fn area(args: &AreaArgs) -> Result<()> {
    let regions = &args.regions;
    let projector = Projector::new(regions.source_crs, args.target_crs)?;

    let mut collection = geojson::read_json(&regions.input)?;
    let features = geojson::features_mut(&mut collection)?;

    let mut measured = 0;
    let mut skipped = 0;
    for (ordinal, raw) in features.iter_mut().enumerate() {
        let geometry = match geojson::parse_geometry(raw.get("geometry")) {
            Ok(geometry) => geometry,
            Err(reason) => {
                tracing::warn!("Skipping feature {}: {}", ordinal, reason);
                skipped += 1;
                continue;
            }
        };
        let feature = Feature {
            geometry,
            properties: Properties::new(),
        };

        let area_km2 = match Region::from_feature(feature, ordinal, &projector) {
            Ok(region) => region.area_km2(),
            Err(MergeError::InvalidGeometry(reason)) => {
                tracing::warn!("Skipping feature {}: {}", ordinal, reason);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let properties = geojson::properties_mut(raw)
            .ok_or_else(|| CliError::GeoJson(format!("feature {ordinal} is not an object")))?;
        properties.insert(args.area_key.clone(), Value::from(area_km2));
        measured += 1;
    }

    geojson::write_json(&regions.output, &collection)?;
    tracing::info!(
        "✓ Areas of {} features written to {} ({} skipped)",
        measured,
        regions.output.display(),
        skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RegionArgs;
    use region_merge_lib::Crs;
    use serde_json::json;
    use std::path::{Path, PathBuf};

    /// Fresh scratch directory under the system temp dir
    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("region-merge-{}-{}", test, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn square(x0: f64, y0: f64, side: f64) -> Value {
        json!([[[x0, y0], [x0 + side, y0], [x0 + side, y0 + side], [x0, y0 + side], [x0, y0]]])
    }

    /// Web Mercator input: A (1 km²) touching B (4 km²), C (9 km²) far away, one null geometry
    fn write_input(dir: &Path) -> PathBuf {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": square(0.0, 0.0, 1000.0)},
                 "properties": {"name": "A"}},
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": square(1000.0, 0.0, 2000.0)},
                 "properties": {"name": "B", "pop": 12}},
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": square(50000.0, 0.0, 3000.0)},
                 "properties": {"name_en": "C"}},
                {"type": "Feature", "geometry": null, "properties": {"name": "Ghost"}}
            ]
        });
        let path = dir.join("input.geojson");
        geojson::write_json(&path, &collection).unwrap();
        path
    }

    fn region_args(dir: &Path, output: &str) -> RegionArgs {
        RegionArgs {
            input: write_input(dir),
            output: dir.join(output),
            source_crs: Crs::WebMercator,
            name_keys: vec!["name".to_string(), "name_en".to_string()],
        }
    }

    #[test]
    fn test_merge_command_writes_output_and_report() {
        let dir = scratch_dir("merge");
        let args = MergeArgs {
            regions: region_args(&dir, "merged.geojson"),
            target_crs: Crs::WebMercator,
            threshold_km2: 2.0,
            max_merges: None,
            report: Some(dir.join("report.json")),
        };
        merge(&args).unwrap();

        let output = geojson::read_features(&dir.join("merged.geojson")).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].properties.get("name_en"), Some(&json!("C")));
        // A merged into B, keeping B's properties
        assert_eq!(output[1].properties.get("name"), Some(&json!("B")));
        assert_eq!(output[1].properties.get("pop"), Some(&json!(12)));

        let report = geojson::read_json(&dir.join("report.json")).unwrap();
        assert_eq!(report["load"]["loaded"], json!(3));
        assert_eq!(report["load"]["skipped"], json!(1));
        assert_eq!(report["summary"]["merges"], json!(1));
        assert_eq!(report["summary"]["reason"], json!("NoRegionBelowThreshold"));
        assert_eq!(report["steps"][0]["absorbed"], json!("A"));
        assert_eq!(report["steps"][0]["kind"], json!("Adjacent"));
    }

    #[test]
    fn test_neighbors_command() {
        let dir = scratch_dir("neighbors");
        let args = NeighborsArgs {
            regions: region_args(&dir, "neighbors.json"),
            target_crs: Crs::WebMercator,
        };
        neighbors(&args).unwrap();

        let output = geojson::read_json(&dir.join("neighbors.json")).unwrap();
        assert_eq!(output, json!({"A": ["B"], "B": ["A"], "C": []}));
    }

    #[test]
    fn test_area_command_annotates_features() {
        let dir = scratch_dir("area");
        let args = AreaArgs {
            regions: region_args(&dir, "area.geojson"),
            target_crs: Crs::WebMercator,
            area_key: "area_km".to_string(),
        };
        area(&args).unwrap();

        let output = geojson::read_json(&dir.join("area.geojson")).unwrap();
        let features = output["features"].as_array().unwrap();
        assert_eq!(features.len(), 4);

        let area_of = |i: usize| features[i]["properties"]["area_km"].as_f64().unwrap();
        assert!((area_of(0) - 1.0).abs() < 1e-9);
        assert!((area_of(1) - 4.0).abs() < 1e-9);
        assert!((area_of(2) - 9.0).abs() < 1e-9);
        assert_eq!(features[1]["properties"]["pop"], json!(12));
        // Invalid features pass through without an area
        assert!(features[3]["properties"].get("area_km").is_none());
    }

    #[test]
    fn test_missing_input_is_an_io_error() {
        let dir = scratch_dir("missing");
        let args = NeighborsArgs {
            regions: RegionArgs {
                input: dir.join("does-not-exist.geojson"),
                output: dir.join("out.json"),
                source_crs: Crs::Wgs84,
                name_keys: vec!["name".to_string()],
            },
            target_crs: Crs::WebMercator,
        };
        assert!(matches!(neighbors(&args), Err(CliError::Io { .. })));
    }
}
