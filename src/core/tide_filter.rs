//! Tidal filtering of observation stacks.
//!
//! Observations acquired far from mean sea level bias the waterline
//! position; only scenes whose modeled tide height lies within a window
//! around the stack's empirical mean tide are retained.

use crate::core::projection::reproject_point;
use crate::io::tide_model::TideModelGrid;
use crate::types::{
    Crs, FilteredStack, ObservationStack, ShoreError, ShoreResult, TideHeight,
};
use ndarray::Array2;

/// Tide-grid resolution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TideResolution {
    /// Sample the coarse grid once at the scene center
    Coarse,
    /// Reproject the coarse grid to every pixel, average for the decision
    HighRes,
}

/// Tidal filtering parameters
#[derive(Debug, Clone)]
pub struct TideFilterParams {
    /// Fraction of the observed tidal range retained around the mean
    pub retention_fraction: f32,
    /// Resolution of tide-height modeling
    pub resolution: TideResolution,
}

impl Default for TideFilterParams {
    fn default() -> Self {
        Self {
            retention_fraction: 0.5,
            resolution: TideResolution::Coarse,
        }
    }
}

/// Tide filter processor
pub struct TideFilter {
    params: TideFilterParams,
}

impl TideFilter {
    pub fn new() -> Self {
        Self {
            params: TideFilterParams::default(),
        }
    }

    pub fn with_params(params: TideFilterParams) -> Self {
        Self { params }
    }

    /// Model a tide height for every observation in the stack.
    ///
    /// Heights come from the coarse constituent grid, reprojected to the
    /// scene extent (high-res mode) or sampled at the scene center (coarse
    /// mode). Scenes falling outside the tide grid get no height and are
    /// treated as unusable by `filter`.
    pub fn model_heights(
        &self,
        stack: &ObservationStack,
        model: &TideModelGrid,
    ) -> ShoreResult<Vec<Option<TideHeight>>> {
        log::info!(
            "Modeling tide heights for {} observations ({:?} mode)",
            stack.observations.len(),
            self.params.resolution
        );

        let geom = &stack.geometry;
        let extent = geom.extent();
        let center_x = (extent.min_x + extent.max_x) / 2.0;
        let center_y = (extent.min_y + extent.max_y) / 2.0;
        let (center_lon, center_lat) =
            reproject_point(geom.crs, Crs::Geographic, center_x, center_y);

        let mut heights = Vec::with_capacity(stack.observations.len());
        for obs in &stack.observations {
            let height = match self.params.resolution {
                TideResolution::Coarse => model
                    .height_at(obs.time, center_lon, center_lat)
                    .map(|h| TideHeight {
                        scene_height: h,
                        grid: None,
                    }),
                TideResolution::HighRes => {
                    self.model_full_resolution(stack, model, obs.time)
                }
            };
            heights.push(height);
        }

        let usable = heights.iter().filter(|h| h.is_some()).count();
        log::debug!(
            "Tide heights available for {}/{} observations",
            usable,
            heights.len()
        );
        Ok(heights)
    }

    /// Reproject the coarse tide grid to the full scene resolution
    fn model_full_resolution(
        &self,
        stack: &ObservationStack,
        model: &TideModelGrid,
        time: chrono::DateTime<chrono::Utc>,
    ) -> Option<TideHeight> {
        let geom = &stack.geometry;
        let mut grid = Array2::from_elem((geom.rows, geom.cols), f32::NAN);
        let mut sum = 0.0f64;
        let mut count = 0usize;

        for row in 0..geom.rows {
            for col in 0..geom.cols {
                let (x, y) = geom
                    .transform
                    .pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
                let (lon, lat) = reproject_point(geom.crs, Crs::Geographic, x, y);
                if let Some(h) = model.height_at(time, lon, lat) {
                    grid[[row, col]] = h;
                    sum += h as f64;
                    count += 1;
                }
            }
        }

        if count == 0 {
            return None;
        }

        Some(TideHeight {
            scene_height: (sum / count as f64) as f32,
            grid: Some(grid),
        })
    }

    /// Retain observations whose tide height lies within
    /// `fraction x range / 2` of the stack's mean tide height.
    ///
    /// An empty result is valid output: downstream compositing is simply
    /// starved of input for the affected period.
    pub fn filter(
        &self,
        stack: ObservationStack,
        heights: &[Option<TideHeight>],
    ) -> ShoreResult<FilteredStack> {
        if heights.len() != stack.observations.len() {
            return Err(ShoreError::Processing(format!(
                "Tide height count {} does not match observation count {}",
                heights.len(),
                stack.observations.len()
            )));
        }

        let scene_heights: Vec<f32> = heights
            .iter()
            .filter_map(|h| h.as_ref().map(|t| t.scene_height))
            .collect();

        if scene_heights.is_empty() {
            log::warn!("No tide heights available; filtered stack is empty");
            return Ok(FilteredStack {
                geometry: stack.geometry,
                observations: Vec::new(),
                tide_heights: Vec::new(),
            });
        }

        let min = scene_heights.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = scene_heights
            .iter()
            .cloned()
            .fold(f32::NEG_INFINITY, f32::max);
        let mean = scene_heights.iter().sum::<f32>() / scene_heights.len() as f32;
        let range = max - min;
        let window = self.params.retention_fraction * range / 2.0;

        log::info!(
            "Tidal range {:.2} m (mean {:.2} m); retaining heights within ±{:.2} m",
            range,
            mean,
            window
        );

        let geometry = stack.geometry;
        let mut observations = Vec::new();
        let mut tide_heights = Vec::new();

        for (obs, height) in stack.observations.into_iter().zip(heights) {
            let Some(tide) = height else { continue };
            if (tide.scene_height - mean).abs() <= window {
                tide_heights.push(tide.scene_height);
                observations.push(obs);
            }
        }

        log::info!(
            "Tide filter retained {}/{} observations",
            observations.len(),
            heights.len()
        );

        Ok(FilteredStack {
            geometry,
            observations,
            tide_heights,
        })
    }

    /// Model heights and filter in one step
    pub fn filter_with_model(
        &self,
        stack: ObservationStack,
        model: &TideModelGrid,
    ) -> ShoreResult<FilteredStack> {
        let heights = self.model_heights(&stack, model)?;
        self.filter(stack, &heights)
    }
}

impl Default for TideFilter {
    fn default() -> Self {
        Self::new()
    }
}
