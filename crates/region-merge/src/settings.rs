use clap::{Args, Parser, Subcommand};
use region_merge_lib::{Crs, MergeConfig};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Region Merge - Dissolve regions below an area threshold into their smallest neighbor
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Merge every region below the threshold into its smallest neighbor
    Merge(MergeArgs),
    /// Write each region's true neighbors as a JSON object keyed by name
    Neighbors(NeighborsArgs),
    /// Copy the input, adding each region's planar area in km² as a property
    Area(AreaArgs),
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Input GeoJSON FeatureCollection
    #[clap(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file
    #[clap(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Coordinate frame of the input (EPSG:4326, EPSG:3857 or EPSG:6933)
    #[clap(long, default_value = "EPSG:4326")]
    pub source_crs: Crs,

    /// Property keys tried in order to name a region (repeatable)
    #[clap(long = "name-key", value_name = "KEY", default_values = ["name", "name_en"])]
    pub name_keys: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[clap(flatten)]
    pub regions: RegionArgs,

    /// Planar frame areas are measured in (EPSG:3857 or EPSG:6933).
    /// EPSG:3857 inflates areas away from the equator; EPSG:6933 gives true areas
    #[clap(long, default_value = "EPSG:3857")]
    pub target_crs: Crs,

    /// Regions with an area strictly below this value (km²) are merged away
    #[clap(short, long, value_name = "KM2")]
    pub threshold_km2: f64,

    /// Stop after this many merges
    #[clap(long)]
    pub max_merges: Option<usize>,

    /// Also write a JSON report of the load, every merge step and the outcome
    #[clap(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NeighborsArgs {
    #[clap(flatten)]
    pub regions: RegionArgs,

    /// Planar frame the spatial index is built in (EPSG:3857 or EPSG:6933)
    #[clap(long, default_value = "EPSG:3857")]
    pub target_crs: Crs,
}

#[derive(Args, Debug, Clone)]
pub struct AreaArgs {
    #[clap(flatten)]
    pub regions: RegionArgs,

    /// Planar frame areas are measured in. The EPSG:6933 default gives true areas;
    /// EPSG:3857 areas are inflated away from the equator
    #[clap(long, default_value = "EPSG:6933")]
    pub target_crs: Crs,

    /// Property that receives the area
    #[clap(long, default_value = "area_km")]
    pub area_key: String,
}

impl RegionArgs {
    /// Engine configuration for these options; the threshold is left at its default
    pub fn merge_config(&self, target_crs: Crs) -> MergeConfig {
        MergeConfig {
            source_crs: self.source_crs,
            target_crs,
            name_keys: self.name_keys.clone(),
            ..MergeConfig::default()
        }
    }
}

impl MergeArgs {
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            threshold_km2: self.threshold_km2,
            max_merges: self.max_merges,
            ..self.regions.merge_config(self.target_crs)
        }
    }
}

impl Settings {
    /// Parse the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}
