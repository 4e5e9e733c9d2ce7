//! Core shoreline analysis modules

pub mod graph;
pub mod projection;
pub mod tide_filter;
pub mod composite;
pub mod coastal_mask;
pub mod contour;
pub mod points;
pub mod movement;
pub mod stats;
pub mod tile_merge;
pub mod pipeline;

// Re-export main types
pub use graph::{DeferredGrid, DEFAULT_CHUNK_ROWS};
pub use projection::{reproject_point, CoordinateProjection, UtmProjection};
pub use tide_filter::{TideFilter, TideFilterParams, TideResolution};
pub use composite::{CompositeBuilder, CompositeParams};
pub use coastal_mask::{CoastalMaskParams, CoastalMasker};
pub use contour::{ContourExtractor, ContourParams};
pub use points::{PointSampler, PointSamplerParams};
pub use movement::{MovementMeasurer, MovementParams};
pub use stats::StatsEngine;
pub use tile_merge::{TileMergeParams, TileMerger};
pub use pipeline::{TileInput, TilePipeline, TileState};
