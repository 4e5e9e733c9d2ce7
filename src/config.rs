//! Typed configuration for shoreline analysis runs.
//!
//! Settings arrive as a YAML document with two recognized groups
//! (input files and analysis parameters) and are threaded explicitly
//! through component constructors rather than held as ambient state.

use crate::types::{Crs, ShoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to externally supplied inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFiles {
    /// Analysis grid definition (tile footprints)
    pub grid_path: PathBuf,
    /// Polygons excluded from the coastal mask (estuaries, ports, ...)
    pub exclusion_path: Option<PathBuf>,
    /// Tide-model archive location
    pub tide_model_path: PathBuf,
}

/// Analysis parameters controlling the extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Name of the water index carried by the observations
    pub water_index: String,
    /// Index threshold separating water from land
    pub index_threshold: f32,
    /// First calendar year of the analysis window (inclusive)
    pub start_year: i32,
    /// Last calendar year of the analysis window (inclusive)
    pub end_year: i32,
    /// Year all movement is measured against
    pub baseline_year: i32,
    /// Fraction of the observed tidal range retained around mean sea level
    pub tide_retention_fraction: f32,
    /// Coastal fringe half-width in pixels
    pub coastal_buffer_pixels: usize,
    /// Arc-length spacing between baseline points (world units)
    pub point_spacing: f64,
    /// Maximum valid distance for normal-ray intersections (world units)
    pub max_valid_distance: f64,
    /// Minimum vertex count for a traced contour line to qualify
    pub min_contour_vertices: usize,
    /// Width of the centered multi-year gapfill window (years)
    pub gapfill_window: usize,
    /// Minimum direct observations per pixel-year before gapfill kicks in
    pub min_clear_obs: u16,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            water_index: "mndwi".to_string(),
            index_threshold: 0.0,
            start_year: 1988,
            end_year: 2021,
            baseline_year: 2021,
            tide_retention_fraction: 0.5,
            coastal_buffer_pixels: 2,
            point_spacing: 30.0,
            max_valid_distance: 5000.0,
            min_contour_vertices: 10,
            gapfill_window: 3,
            min_clear_obs: 1,
        }
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub input: InputFiles,
    #[serde(default)]
    pub analysis: AnalysisParams,
}

impl ProjectConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ShoreResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(text: &str) -> ShoreResult<Self> {
        let config: ProjectConfig = serde_yaml::from_str(text)?;
        log::debug!(
            "Analysis window {}-{}, baseline {}",
            config.analysis.start_year,
            config.analysis.end_year,
            config.analysis.baseline_year
        );
        Ok(config)
    }
}

/// Per-tile invocation parameters.
///
/// Produced by the orchestration layer for each tile run. The core reads
/// the identifiers and year range; the storage flags are carried through
/// untouched for the orchestrator's own use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileParams {
    /// Tile identifier (also the merge priority key)
    pub tile_id: String,
    /// Path of the configuration document this run uses
    pub config_path: PathBuf,
    /// Tide-model location override, if different from the configured one
    pub tide_model_path: Option<PathBuf>,
    /// Version string stamped on outputs
    pub output_version: String,
    /// Destination for per-tile outputs
    pub output_location: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub baseline_year: i32,
    /// Replace existing outputs instead of skipping
    #[serde(default)]
    pub overwrite: bool,
    /// Allow the orchestrator to retry this tile on transient failure
    #[serde(default = "default_true")]
    pub retry_safe: bool,
    /// Requester-pays flag for object storage reads
    #[serde(default)]
    pub request_payer: bool,
    /// Target coordinate system for the merged product
    pub target_crs: Option<Crs>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = AnalysisParams::default();
        assert_eq!(params.tide_retention_fraction, 0.5);
        assert_eq!(params.point_spacing, 30.0);
        assert_eq!(params.gapfill_window, 3);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
input:
  grid_path: /data/grid.geojson
  exclusion_path: /data/exclusions.geojson
  tide_model_path: /data/tides.zip
analysis:
  water_index: mndwi
  index_threshold: 0.0
  start_year: 2000
  end_year: 2020
  baseline_year: 2020
  point_spacing: 30.0
"#;
        let config = ProjectConfig::from_yaml_str(yaml).expect("valid yaml");
        assert_eq!(config.analysis.start_year, 2000);
        assert_eq!(config.analysis.baseline_year, 2020);
        // Unspecified fields fall back to defaults
        assert_eq!(config.analysis.gapfill_window, 3);
        assert_eq!(
            config.input.grid_path,
            PathBuf::from("/data/grid.geojson")
        );
    }

    #[test]
    fn test_parse_yaml_missing_input_fails() {
        let yaml = "analysis:\n  start_year: 2000\n";
        assert!(ProjectConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_tile_params_defaults() {
        let yaml = r#"
tile_id: "x104y126"
config_path: /data/config.yaml
output_version: "2.1.0"
output_location: /out/x104y126
start_year: 2000
end_year: 2020
baseline_year: 2020
"#;
        let params: TileParams = serde_yaml::from_str(yaml).expect("valid yaml");
        assert!(!params.overwrite);
        assert!(params.retry_safe);
        assert!(!params.request_payer);
        assert!(params.target_crs.is_none());
    }
}
