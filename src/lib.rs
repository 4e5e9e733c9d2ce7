//! shoreline: A Fast, Modular Shoreline Change Processor
//!
//! This library turns tide-biased satellite water-index time series into
//! annual sub-pixel shoreline positions and per-point coastal change
//! statistics: tidal filtering, gapfilled yearly median composites,
//! coastal-fringe masking, contour extraction, cross-shore movement
//! measurement, trend fitting and multi-tile merging.

pub mod types;
pub mod config;
pub mod core;
pub mod io;

// Re-export main types for easier access
pub use types::{
    BaselinePoint, BoundingBox, Certainty, CompositeRaster, Contour, ContourSet, Crs,
    FilteredStack, GeoTransform, GridGeometry, MergedOutput, Observation, ObservationStack,
    PointRecord, RegressionStats, ShoreError, ShoreResult, TideHeight, TileOutput,
};

pub use config::{AnalysisParams, InputFiles, ProjectConfig, TileParams};
pub use core::{TileInput, TilePipeline, TileState};
pub use io::{TideModelGrid, TideModelReader, VectorWriter};
