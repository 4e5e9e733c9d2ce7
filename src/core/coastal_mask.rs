//! Coastal fringe masking.
//!
//! Restricts composites to a buffer around the water/land interface so
//! contour extraction never wanders into inland water bodies or open
//! ocean, and removes user-supplied exclusion zones (ports, aquaculture,
//! heavily modified shorelines).

use crate::types::{
    Certainty, CompositeRaster, GridGeometry, MaskImage, ShoreError, ShoreResult,
};
use geo::{Contains, Point, Polygon};
use ndarray::Array2;

/// Coastal masking parameters
#[derive(Debug, Clone)]
pub struct CoastalMaskParams {
    /// Water index threshold separating water from land
    pub index_threshold: f32,
    /// Fringe half-width in pixels around the waterline
    pub buffer_pixels: usize,
}

impl Default for CoastalMaskParams {
    fn default() -> Self {
        Self {
            index_threshold: 0.0,
            buffer_pixels: 2,
        }
    }
}

/// Coastal fringe mask processor
pub struct CoastalMasker {
    params: CoastalMaskParams,
    exclusions: Vec<Polygon<f64>>,
}

impl CoastalMasker {
    pub fn new(params: CoastalMaskParams) -> Self {
        Self {
            params,
            exclusions: Vec::new(),
        }
    }

    /// Attach exclusion polygons in world coordinates
    pub fn with_exclusions(mut self, exclusions: Vec<Polygon<f64>>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Build the coastal fringe mask for a composite stack.
    ///
    /// The water/land classification comes from the external layer when
    /// provided, otherwise from a pixel-wise majority vote over the
    /// binarized composites. The waterline boundary is dilated by the
    /// buffer width and exclusion polygons are subtracted.
    pub fn build_fringe(
        &self,
        composites: &[CompositeRaster],
        external_water: Option<&MaskImage>,
    ) -> ShoreResult<MaskImage> {
        let Some(first) = composites.first() else {
            return Err(ShoreError::DataUnavailable(
                "No composites to mask".to_string(),
            ));
        };
        let geom = first.geometry;
        let (rows, cols) = (geom.rows, geom.cols);

        let water = match external_water {
            Some(layer) => {
                if layer.dim() != (rows, cols) {
                    return Err(ShoreError::Processing(format!(
                        "External water layer shape {:?} does not match grid {}x{}",
                        layer.dim(),
                        rows,
                        cols
                    )));
                }
                log::info!("Using external water classification for fringe placement");
                layer.clone()
            }
            None => self.majority_water(composites, rows, cols),
        };

        let boundary = Self::class_boundary(&water);
        let mut fringe = dilate_bool(&boundary, self.params.buffer_pixels);

        let removed = self.apply_exclusions(&mut fringe, &geom);
        let fringe_pixels = fringe.iter().filter(|&&v| v).count();
        log::info!(
            "Coastal fringe covers {} pixels ({} removed by exclusions)",
            fringe_pixels,
            removed
        );

        Ok(fringe)
    }

    /// Mask a composite stack to the coastal fringe.
    ///
    /// Pixels outside the fringe get NaN values and a `MaskedOut`
    /// certainty; they never reach contour extraction.
    pub fn mask(
        &self,
        mut composites: Vec<CompositeRaster>,
        external_water: Option<&MaskImage>,
    ) -> ShoreResult<Vec<CompositeRaster>> {
        let fringe = self.build_fringe(&composites, external_water)?;

        for composite in &mut composites {
            for ((row, col), keep) in fringe.indexed_iter() {
                if !keep {
                    composite.index[[row, col]] = f32::NAN;
                    if composite.certainty[[row, col]] != Certainty::NoData {
                        composite.certainty[[row, col]] = Certainty::MaskedOut;
                    }
                }
            }
        }

        Ok(composites)
    }

    /// Pixel-wise majority vote over binarized composites.
    /// Pixels with no data in any year count as land (not coastal).
    fn majority_water(
        &self,
        composites: &[CompositeRaster],
        rows: usize,
        cols: usize,
    ) -> MaskImage {
        let threshold = self.params.index_threshold;
        let mut water = Array2::from_elem((rows, cols), false);

        for row in 0..rows {
            for col in 0..cols {
                let mut wet = 0usize;
                let mut dry = 0usize;
                for composite in composites {
                    let v = composite.index[[row, col]];
                    if v.is_finite() {
                        if v >= threshold {
                            wet += 1;
                        } else {
                            dry += 1;
                        }
                    }
                }
                water[[row, col]] = wet > dry;
            }
        }
        water
    }

    /// Mark cells adjacent (4-connected) to the opposite class
    fn class_boundary(water: &MaskImage) -> MaskImage {
        let (rows, cols) = water.dim();
        let mut boundary = Array2::from_elem((rows, cols), false);

        for row in 0..rows {
            for col in 0..cols {
                let center = water[[row, col]];
                let neighbors = [
                    (row.wrapping_sub(1), col),
                    (row + 1, col),
                    (row, col.wrapping_sub(1)),
                    (row, col + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr < rows && nc < cols && water[[nr, nc]] != center {
                        boundary[[row, col]] = true;
                        break;
                    }
                }
            }
        }
        boundary
    }

    /// Remove fringe pixels whose centers fall inside an exclusion polygon.
    /// Returns the number of pixels removed.
    fn apply_exclusions(&self, fringe: &mut MaskImage, geom: &GridGeometry) -> usize {
        if self.exclusions.is_empty() {
            return 0;
        }

        let mut removed = 0usize;
        for ((row, col), value) in fringe.indexed_iter_mut() {
            if !*value {
                continue;
            }
            let (x, y) = geom
                .transform
                .pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
            let center = Point::new(x, y);
            if self.exclusions.iter().any(|p| p.contains(&center)) {
                *value = false;
                removed += 1;
            }
        }
        removed
    }
}

/// Boolean dilation with a square structuring element (Chebyshev radius)
fn dilate_bool(mask: &MaskImage, radius: usize) -> MaskImage {
    if radius == 0 {
        return mask.clone();
    }
    let (rows, cols) = mask.dim();
    let r = radius as isize;
    let mut out = Array2::from_elem((rows, cols), false);

    for row in 0..rows {
        for col in 0..cols {
            if !mask[[row, col]] {
                continue;
            }
            let r0 = (row as isize - r).max(0) as usize;
            let r1 = ((row as isize + r) as usize).min(rows - 1);
            let c0 = (col as isize - r).max(0) as usize;
            let c1 = ((col as isize + r) as usize).min(cols - 1);
            for nr in r0..=r1 {
                for nc in c0..=c1 {
                    out[[nr, nc]] = true;
                }
            }
        }
    }
    out
}
