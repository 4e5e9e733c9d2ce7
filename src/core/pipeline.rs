//! Per-tile processing pipeline and multi-tile orchestration.
//!
//! One tile runs the full chain: tide filtering, yearly compositing
//! (materialized before any contour work), coastal masking, contour
//! extraction, point sampling, movement measurement and statistics.
//! Tiles are independent; `run_tiles` fans them out over the worker pool
//! and a failing tile never takes down its neighbours.

use crate::config::AnalysisParams;
use crate::core::coastal_mask::{CoastalMaskParams, CoastalMasker};
use crate::core::composite::{CompositeBuilder, CompositeParams};
use crate::core::contour::{ContourExtractor, ContourParams};
use crate::core::movement::{MovementMeasurer, MovementParams};
use crate::core::points::{PointSampler, PointSamplerParams};
use crate::core::stats::StatsEngine;
use crate::core::tide_filter::{TideFilter, TideFilterParams, TideResolution};
use crate::core::tile_merge::{TileMergeParams, TileMerger};
use crate::io::tide_model::TideModelGrid;
use crate::types::{
    ContourSet, MaskImage, MergedOutput, ObservationStack, ShoreResult, TileOutput,
};
use geo::Polygon;

/// Everything one tile run needs
pub struct TileInput {
    pub tile_id: String,
    pub stack: ObservationStack,
    pub tide_model: TideModelGrid,
    /// Exclusion polygons in the tile's CRS
    pub exclusions: Vec<Polygon<f64>>,
    /// Optional external water classification for fringe placement
    pub external_water: Option<MaskImage>,
}

/// Outcome of one tile run
#[derive(Debug)]
pub enum TileState {
    Succeeded(TileOutput),
    /// The tile ran to completion but produced no geometry
    Empty(String),
    Failed { tile_id: String, error: String },
}

/// Full per-tile processing chain
pub struct TilePipeline {
    analysis: AnalysisParams,
}

impl TilePipeline {
    pub fn new(analysis: AnalysisParams) -> Self {
        Self { analysis }
    }

    /// Run the complete chain for one tile.
    ///
    /// An empty result (no observations survive tide filtering, or no
    /// contour qualifies) is returned as an empty `TileOutput`, not an
    /// error; only real processing failures propagate.
    pub fn run(&self, input: TileInput) -> ShoreResult<TileOutput> {
        let a = &self.analysis;
        log::info!(
            "🌊 Processing tile {} ({} observations, {}-{})",
            input.tile_id,
            input.stack.observations.len(),
            a.start_year,
            a.end_year
        );
        let geometry = input.stack.geometry;

        let filter = TideFilter::with_params(TideFilterParams {
            retention_fraction: a.tide_retention_fraction,
            resolution: TideResolution::Coarse,
        });
        let filtered = filter.filter_with_model(input.stack, &input.tide_model)?;

        if filtered.observations.is_empty() {
            log::warn!("Tile {}: no observations after tide filtering", input.tile_id);
            return Ok(TileOutput {
                tile_id: input.tile_id,
                geometry,
                points: Vec::new(),
                contours: ContourSet::new(),
            });
        }

        let builder = CompositeBuilder::new(CompositeParams {
            start_year: a.start_year,
            end_year: a.end_year,
            gapfill_window: a.gapfill_window,
            min_clear_obs: a.min_clear_obs,
        })?;
        let composites = builder.build(&filtered)?;

        let masker = CoastalMasker::new(CoastalMaskParams {
            index_threshold: a.index_threshold,
            buffer_pixels: a.coastal_buffer_pixels,
        })
        .with_exclusions(input.exclusions);
        let masked = masker.mask(composites, input.external_water.as_ref())?;

        let extractor = ContourExtractor::new(ContourParams {
            threshold: a.index_threshold,
            min_vertices: a.min_contour_vertices,
        });
        let contours = extractor.extract_all(&masked)?;

        let Some(baseline) = contours.get(&a.baseline_year) else {
            log::warn!(
                "Tile {}: no contour for baseline year {}",
                input.tile_id,
                a.baseline_year
            );
            return Ok(TileOutput {
                tile_id: input.tile_id,
                geometry,
                points: Vec::new(),
                contours,
            });
        };

        let sampler = PointSampler::new(PointSamplerParams {
            spacing: a.point_spacing,
        });
        let points = sampler.sample(baseline)?;

        let measurer = MovementMeasurer::new(MovementParams {
            start_year: a.start_year,
            end_year: a.end_year,
            baseline_year: a.baseline_year,
            max_distance: a.max_valid_distance,
        });
        let mut records = measurer.measure(&points, &contours)?;

        StatsEngine::new().annotate(&mut records)?;

        log::info!(
            "✅ Tile {}: {} points, {} contour years",
            input.tile_id,
            records.len(),
            contours.len()
        );
        Ok(TileOutput {
            tile_id: input.tile_id,
            geometry,
            points: records,
            contours,
        })
    }

    /// Run many tiles, isolating failures per tile.
    pub fn run_tiles(&self, inputs: Vec<TileInput>) -> Vec<TileState> {
        log::info!("Processing {} tiles", inputs.len());
        self.map_tiles(inputs)
    }

    /// Run tiles and merge the survivors into one product.
    pub fn run_and_merge(
        &self,
        inputs: Vec<TileInput>,
        merge: TileMergeParams,
    ) -> ShoreResult<MergedOutput> {
        let states = self.run_tiles(inputs);

        let mut outputs = Vec::new();
        for state in states {
            match state {
                TileState::Succeeded(output) => outputs.push(output),
                TileState::Empty(tile_id) => {
                    log::warn!("Tile {} produced no geometry", tile_id)
                }
                TileState::Failed { tile_id, error } => {
                    log::error!("Tile {} failed: {}", tile_id, error)
                }
            }
        }

        TileMerger::new(merge).merge(outputs)
    }

    fn state_of(&self, input: TileInput) -> TileState {
        let tile_id = input.tile_id.clone();
        match self.run(input) {
            Ok(output) if output.is_empty() => TileState::Empty(output.tile_id),
            Ok(output) => TileState::Succeeded(output),
            Err(e) => TileState::Failed {
                tile_id,
                error: e.to_string(),
            },
        }
    }

    #[cfg(feature = "parallel")]
    fn map_tiles(&self, inputs: Vec<TileInput>) -> Vec<TileState> {
        use rayon::prelude::*;
        inputs
            .into_par_iter()
            .map(|input| self.state_of(input))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn map_tiles(&self, inputs: Vec<TileInput>) -> Vec<TileState> {
        inputs.into_iter().map(|input| self.state_of(input)).collect()
    }
}
