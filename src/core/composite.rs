//! Yearly median compositing with multi-year gapfill.
//!
//! Reduces a tide-filtered time series to one composite raster per calendar
//! year: the per-pixel median of that year's valid observations, an
//! observation-count layer, and a certainty classification. Pixels without
//! direct coverage take the median over a centered multi-year window
//! instead; direct and gapfilled values are never blended within one pixel.

use crate::core::graph::DeferredGrid;
use crate::types::{
    Certainty, CompositeRaster, FilteredStack, ShoreError, ShoreResult,
};
use ndarray::Array2;
use num_traits::Float;

/// Compositing parameters
#[derive(Debug, Clone)]
pub struct CompositeParams {
    /// First calendar year (inclusive)
    pub start_year: i32,
    /// Last calendar year (inclusive)
    pub end_year: i32,
    /// Width of the centered gapfill window in years (odd)
    pub gapfill_window: usize,
    /// Direct observations required per pixel-year to skip gapfill
    pub min_clear_obs: u16,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            start_year: 1988,
            end_year: 2021,
            gapfill_window: 3,
            min_clear_obs: 1,
        }
    }
}

/// Yearly composite builder
pub struct CompositeBuilder {
    params: CompositeParams,
}

impl CompositeBuilder {
    pub fn new(params: CompositeParams) -> ShoreResult<Self> {
        if params.end_year < params.start_year {
            return Err(ShoreError::Processing(format!(
                "Invalid year range {}-{}",
                params.start_year, params.end_year
            )));
        }
        if params.gapfill_window % 2 == 0 {
            return Err(ShoreError::Processing(
                "Gapfill window must be odd (centered)".to_string(),
            ));
        }
        Ok(Self { params })
    }

    /// Build one composite raster per year in the configured range.
    ///
    /// The yearly reduction runs as a deferred chunked computation; each
    /// returned `CompositeRaster` is fully materialized and safe for random
    /// access by contour extraction.
    pub fn build(&self, stack: &FilteredStack) -> ShoreResult<Vec<CompositeRaster>> {
        let geom = stack.geometry;
        let (rows, cols) = (geom.rows, geom.cols);

        for obs in &stack.observations {
            if obs.index.dim() != (rows, cols) || obs.quality.dim() != (rows, cols) {
                return Err(ShoreError::Processing(format!(
                    "Observation at {} does not match grid shape {}x{}",
                    obs.time, rows, cols
                )));
            }
        }

        log::info!(
            "Building composites {}-{} from {} filtered observations",
            self.params.start_year,
            self.params.end_year,
            stack.observations.len()
        );

        let half_window = (self.params.gapfill_window / 2) as i32;
        let mut composites = Vec::new();

        for year in self.params.start_year..=self.params.end_year {
            let direct: Vec<usize> = stack
                .observations
                .iter()
                .enumerate()
                .filter(|(_, o)| o.year() == year)
                .map(|(i, _)| i)
                .collect();
            let window: Vec<usize> = stack
                .observations
                .iter()
                .enumerate()
                .filter(|(_, o)| (o.year() - year).abs() <= half_window)
                .map(|(i, _)| i)
                .collect();

            log::debug!(
                "Year {}: {} direct observations, {} in gapfill window",
                year,
                direct.len(),
                window.len()
            );

            let min_clear = self.params.min_clear_obs;
            let observations = &stack.observations;

            let grid = DeferredGrid::new(rows, cols, move |range| {
                let mut out = Vec::with_capacity(range.len() * cols);
                let mut values: Vec<f32> = Vec::new();

                for row in range {
                    for col in 0..cols {
                        values.clear();
                        for &i in &direct {
                            let obs = &observations[i];
                            let v = obs.index[[row, col]];
                            if obs.quality[[row, col]] && v.is_finite() {
                                values.push(v);
                            }
                        }
                        let count = values.len() as u16;

                        if count >= min_clear && count > 0 {
                            out.push((median(&mut values), count, Certainty::Direct));
                            continue;
                        }

                        // Gapfill: window median, never blended with direct values
                        values.clear();
                        for &i in &window {
                            let obs = &observations[i];
                            let v = obs.index[[row, col]];
                            if obs.quality[[row, col]] && v.is_finite() {
                                values.push(v);
                            }
                        }

                        if values.is_empty() {
                            out.push((f32::NAN, count, Certainty::NoData));
                        } else {
                            out.push((median(&mut values), count, Certainty::Gapfilled));
                        }
                    }
                }
                out
            });

            let combined = grid.materialize()?;
            let index = combined.mapv(|(v, _, _)| v);
            let count = combined.mapv(|(_, c, _)| c);
            let certainty: Array2<Certainty> = combined.mapv(|(_, _, cert)| cert);

            composites.push(CompositeRaster {
                year,
                geometry: geom,
                index,
                count,
                certainty,
            });
        }

        let with_data = composites.iter().filter(|c| !c.is_empty()).count();
        log::info!(
            "Built {} composites, {} with usable data",
            composites.len(),
            with_data
        );
        Ok(composites)
    }
}

/// Median of a non-empty slice; sorts in place
fn median<T: Float>(values: &mut [T]) -> T {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        let two = T::one() + T::one();
        (values[n / 2 - 1] + values[n / 2]) / two
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Crs, GeoTransform, GridGeometry, Observation};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn geom(rows: usize, cols: usize) -> GridGeometry {
        GridGeometry {
            transform: GeoTransform::north_up(0.0, rows as f64 * 30.0, 30.0),
            crs: Crs::Utm { zone: 50, northern: false },
            rows,
            cols,
        }
    }

    fn obs(year: i32, month: u32, value: f32) -> Observation {
        Observation {
            time: Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(),
            index: Array2::from_elem((2, 2), value),
            quality: Array2::from_elem((2, 2), true),
        }
    }

    fn stack(observations: Vec<Observation>) -> FilteredStack {
        let n = observations.len();
        FilteredStack {
            geometry: geom(2, 2),
            observations,
            tide_heights: vec![0.0; n],
        }
    }

    fn builder(start: i32, end: i32) -> CompositeBuilder {
        CompositeBuilder::new(CompositeParams {
            start_year: start,
            end_year: end,
            gapfill_window: 3,
            min_clear_obs: 1,
        })
        .expect("valid params")
    }

    #[test]
    fn test_direct_median() {
        let s = stack(vec![obs(2010, 3, 1.0), obs(2010, 6, 9.0), obs(2010, 9, 2.0)]);
        let composites = builder(2010, 2010).build(&s).expect("build");
        let c = &composites[0];
        assert_eq!(c.index[[0, 0]], 2.0);
        assert_eq!(c.count[[0, 0]], 3);
        assert_eq!(c.certainty[[0, 0]], Certainty::Direct);
    }

    #[test]
    fn test_even_count_median_averages() {
        let s = stack(vec![obs(2010, 3, 1.0), obs(2010, 6, 3.0)]);
        let composites = builder(2010, 2010).build(&s).expect("build");
        assert_eq!(composites[0].index[[0, 0]], 2.0);
    }

    #[test]
    fn test_gapfill_from_window() {
        // No 2011 observations; neighbors from 2010 and 2012 fill the year
        let s = stack(vec![obs(2010, 6, 1.0), obs(2012, 6, 3.0)]);
        let composites = builder(2010, 2012).build(&s).expect("build");

        let c2011 = &composites[1];
        assert_eq!(c2011.certainty[[0, 0]], Certainty::Gapfilled);
        assert_eq!(c2011.count[[0, 0]], 0);
        assert_eq!(c2011.index[[0, 0]], 2.0);
    }

    #[test]
    fn test_direct_never_blended_with_window() {
        // 2011 has a direct value; the window median would differ
        let s = stack(vec![obs(2010, 6, 0.0), obs(2011, 6, 5.0), obs(2012, 6, 0.0)]);
        let composites = builder(2011, 2011).build(&s).expect("build");
        let c = &composites[0];
        assert_eq!(c.index[[0, 0]], 5.0);
        assert_eq!(c.certainty[[0, 0]], Certainty::Direct);
    }

    #[test]
    fn test_no_data_after_gapfill() {
        let s = stack(vec![obs(2010, 6, 1.0)]);
        // 2015 is far outside any window
        let composites = builder(2015, 2015).build(&s).expect("build");
        let c = &composites[0];
        assert!(c.index[[0, 0]].is_nan());
        assert_eq!(c.certainty[[0, 0]], Certainty::NoData);
        assert!(c.is_empty());
    }

    #[test]
    fn test_quality_mask_excludes_values() {
        let mut bad = obs(2010, 6, 100.0);
        bad.quality.fill(false);
        let s = stack(vec![obs(2010, 3, 1.0), bad]);
        let composites = builder(2010, 2010).build(&s).expect("build");
        let c = &composites[0];
        assert_eq!(c.index[[0, 0]], 1.0);
        assert_eq!(c.count[[0, 0]], 1);
    }

    #[test]
    fn test_even_gapfill_window_rejected() {
        let result = CompositeBuilder::new(CompositeParams {
            start_year: 2010,
            end_year: 2011,
            gapfill_window: 4,
            min_clear_obs: 1,
        });
        assert!(result.is_err());
    }
}
