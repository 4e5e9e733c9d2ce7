//! Tide-model archive handling.
//!
//! The tide model arrives as a zip archive of per-region constituent grids
//! (amplitude and phase of the M2 and S2 constituents on a coarse geographic
//! grid, in ESRI ASCII grid format, optionally gzipped). The archive is
//! unpacked to a known directory before filtering starts; heights are then
//! evaluated on demand for any (time, location) pair.

use crate::types::{GeoTransform, ShoreError, ShoreResult};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// M2 (principal lunar semidiurnal) period in seconds
const M2_PERIOD_S: f64 = 12.420_601_2 * 3600.0;
/// S2 (principal solar semidiurnal) period in seconds
const S2_PERIOD_S: f64 = 12.0 * 3600.0;

/// Coarse harmonic-constituent grid for one tide-model region.
///
/// Heights are modeled as the sum of the M2 and S2 constituents:
/// `h(t) = A_m2 cos(w_m2 t - p_m2) + A_s2 cos(w_s2 t - p_s2)`,
/// with phases in radians and t in seconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct TideModelGrid {
    pub region: String,
    /// Geographic (lon/lat) north-up transform of the coarse grid
    pub transform: GeoTransform,
    pub m2_amplitude: Array2<f32>,
    pub m2_phase: Array2<f32>,
    pub s2_amplitude: Array2<f32>,
    pub s2_phase: Array2<f32>,
}

impl TideModelGrid {
    pub fn shape(&self) -> (usize, usize) {
        self.m2_amplitude.dim()
    }

    /// Modeled tide height at a geographic location and time.
    /// Returns `None` outside the grid or over nodata cells.
    pub fn height_at(&self, time: DateTime<Utc>, lon: f64, lat: f64) -> Option<f32> {
        let m2_amp = self.sample(&self.m2_amplitude, lon, lat)?;
        let m2_pha = self.sample(&self.m2_phase, lon, lat)?;
        let s2_amp = self.sample(&self.s2_amplitude, lon, lat)?;
        let s2_pha = self.sample(&self.s2_phase, lon, lat)?;

        let t = time.timestamp() as f64;
        let m2 = m2_amp as f64 * (2.0 * std::f64::consts::PI * t / M2_PERIOD_S - m2_pha as f64).cos();
        let s2 = s2_amp as f64 * (2.0 * std::f64::consts::PI * t / S2_PERIOD_S - s2_pha as f64).cos();
        Some((m2 + s2) as f32)
    }

    /// Bilinear sample of one constituent layer at a geographic location
    fn sample(&self, layer: &Array2<f32>, lon: f64, lat: f64) -> Option<f32> {
        let (rows, cols) = layer.dim();
        let (col, row) = self.transform.world_to_pixel(lon, lat);
        // Sample relative to cell centers
        let col = col - 0.5;
        let row = row - 0.5;

        if col < -0.5 || row < -0.5 || col > cols as f64 - 0.5 || row > rows as f64 - 0.5 {
            return None;
        }

        let c0 = col.floor().clamp(0.0, cols as f64 - 1.0) as usize;
        let r0 = row.floor().clamp(0.0, rows as f64 - 1.0) as usize;
        let c1 = (c0 + 1).min(cols - 1);
        let r1 = (r0 + 1).min(rows - 1);
        let fc = (col - c0 as f64).clamp(0.0, 1.0) as f32;
        let fr = (row - r0 as f64).clamp(0.0, 1.0) as f32;

        let v00 = layer[[r0, c0]];
        let v01 = layer[[r0, c1]];
        let v10 = layer[[r1, c0]];
        let v11 = layer[[r1, c1]];

        if v00.is_nan() || v01.is_nan() || v10.is_nan() || v11.is_nan() {
            // Fall back to the nearest finite cell
            let nearest = layer[[
                if fr < 0.5 { r0 } else { r1 },
                if fc < 0.5 { c0 } else { c1 },
            ]];
            return if nearest.is_nan() { None } else { Some(nearest) };
        }

        let top = v00 * (1.0 - fc) + v01 * fc;
        let bottom = v10 * (1.0 - fc) + v11 * fc;
        Some(top * (1.0 - fr) + bottom * fr)
    }
}

/// Tide-model archive reader
pub struct TideModelReader;

impl TideModelReader {
    const LAYERS: [&'static str; 4] =
        ["m2_amplitude", "m2_phase", "s2_amplitude", "s2_phase"];

    /// Unpack a tide-model zip archive into a destination directory.
    ///
    /// Gzipped grid members (`.asc.gz`) are decompressed on extraction.
    /// Returns the paths of the extracted files.
    pub fn unpack_archive<P: AsRef<Path>, Q: AsRef<Path>>(
        archive_path: P,
        dest_dir: Q,
    ) -> ShoreResult<Vec<PathBuf>> {
        log::info!(
            "Unpacking tide-model archive: {}",
            archive_path.as_ref().display()
        );

        let file = File::open(archive_path.as_ref())?;
        let mut archive = zip::ZipArchive::new(file)?;
        std::fs::create_dir_all(dest_dir.as_ref())?;

        let mut extracted = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(rel_path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
                log::warn!("Skipping archive entry with unsafe path: {}", entry.name());
                continue;
            };

            if entry.is_dir() {
                continue;
            }

            let gzipped = rel_path
                .extension()
                .map(|e| e == "gz")
                .unwrap_or(false);
            let out_path = if gzipped {
                dest_dir.as_ref().join(rel_path.with_extension(""))
            } else {
                dest_dir.as_ref().join(&rel_path)
            };

            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut out_file = File::create(&out_path)?;
            if gzipped {
                let mut decoder = GzDecoder::new(&mut entry);
                std::io::copy(&mut decoder, &mut out_file)?;
            } else {
                std::io::copy(&mut entry, &mut out_file)?;
            }

            log::debug!("Extracted {}", out_path.display());
            extracted.push(out_path);
        }

        if extracted.is_empty() {
            return Err(ShoreError::DataUnavailable(
                "Tide-model archive contained no grid files".to_string(),
            ));
        }

        log::info!("Extracted {} tide-model files", extracted.len());
        Ok(extracted)
    }

    /// Unpack an archive and read one region, retrying transient failures.
    ///
    /// Archive access is the retryable part; a region genuinely missing
    /// from an unpacked archive fails every attempt and surfaces as is.
    pub fn fetch<P: AsRef<Path>, Q: AsRef<Path>>(
        archive_path: P,
        unpack_dir: Q,
        region: &str,
        attempts: usize,
    ) -> ShoreResult<TideModelGrid> {
        retry_with_backoff(attempts, Duration::from_secs(1), "tide-model fetch", || {
            Self::unpack_archive(archive_path.as_ref(), unpack_dir.as_ref())?;
            Self::read_region(unpack_dir.as_ref(), region)
        })
    }

    /// Read the constituent grids for one region from an unpacked directory.
    ///
    /// Expects `<dir>/<region>/<layer>.asc` for the four constituent layers.
    pub fn read_region<P: AsRef<Path>>(dir: P, region: &str) -> ShoreResult<TideModelGrid> {
        let region_dir = dir.as_ref().join(region);
        log::info!("Reading tide model for region '{}'", region);

        let mut layers = Vec::with_capacity(Self::LAYERS.len());
        let mut transform: Option<GeoTransform> = None;

        for layer in Self::LAYERS {
            let path = region_dir.join(format!("{}.asc", layer));
            if !path.exists() {
                return Err(ShoreError::DataUnavailable(format!(
                    "Missing tide constituent grid: {}",
                    path.display()
                )));
            }
            let (data, gt) = Self::read_ascii_grid(&path)?;

            if let Some(first) = &transform {
                if (first.top_left_x - gt.top_left_x).abs() > 1e-9
                    || (first.pixel_width - gt.pixel_width).abs() > 1e-9
                {
                    return Err(ShoreError::InvalidFormat(format!(
                        "Constituent grid {} disagrees with region geometry",
                        path.display()
                    )));
                }
            } else {
                transform = Some(gt);
            }
            layers.push(data);
        }

        let s2_phase = layers.pop().unwrap_or_default();
        let s2_amplitude = layers.pop().unwrap_or_default();
        let m2_phase = layers.pop().unwrap_or_default();
        let m2_amplitude = layers.pop().unwrap_or_default();

        Ok(TideModelGrid {
            region: region.to_string(),
            transform: transform.ok_or_else(|| {
                ShoreError::InvalidFormat("No constituent grids read".to_string())
            })?,
            m2_amplitude,
            m2_phase,
            s2_amplitude,
            s2_phase,
        })
    }

    /// Parse one ESRI ASCII grid file
    fn read_ascii_grid(path: &Path) -> ShoreResult<(Array2<f32>, GeoTransform)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse_ascii_grid(&text)
            .map_err(|e| ShoreError::InvalidFormat(format!("{}: {}", path.display(), e)))
    }

    fn parse_ascii_grid(text: &str) -> Result<(Array2<f32>, GeoTransform), String> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xllcorner = None;
        let mut yllcorner = None;
        let mut cellsize = None;
        let mut nodata = f32::NAN;

        let mut lines = text.lines().peekable();
        while let Some(line) = lines.peek() {
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else {
                lines.next();
                continue;
            };
            let value = parts.next();
            let parsed: Option<f64> = value.and_then(|v| v.parse().ok());

            match key.to_lowercase().as_str() {
                "ncols" => ncols = parsed.map(|v| v as usize),
                "nrows" => nrows = parsed.map(|v| v as usize),
                "xllcorner" => xllcorner = parsed,
                "yllcorner" => yllcorner = parsed,
                "cellsize" => cellsize = parsed,
                "nodata_value" => {
                    nodata = parsed.map(|v| v as f32).unwrap_or(f32::NAN);
                }
                _ => break, // first data row
            }
            lines.next();
        }

        let ncols = ncols.ok_or("missing ncols")?;
        let nrows = nrows.ok_or("missing nrows")?;
        let xllcorner = xllcorner.ok_or("missing xllcorner")?;
        let yllcorner = yllcorner.ok_or("missing yllcorner")?;
        let cellsize = cellsize.ok_or("missing cellsize")?;

        let mut data = Vec::with_capacity(nrows * ncols);
        for line in lines {
            for token in line.split_whitespace() {
                let v: f32 = token
                    .parse()
                    .map_err(|_| format!("bad grid value '{}'", token))?;
                data.push(if v == nodata { f32::NAN } else { v });
            }
        }

        if data.len() != nrows * ncols {
            return Err(format!(
                "expected {} values, found {}",
                nrows * ncols,
                data.len()
            ));
        }

        let array = Array2::from_shape_vec((nrows, ncols), data)
            .map_err(|e| format!("grid reshape failed: {}", e))?;

        // Rows are stored north to south
        let transform = GeoTransform::north_up(
            xllcorner,
            yllcorner + nrows as f64 * cellsize,
            cellsize,
        );

        Ok((array, transform))
    }
}

/// Retry a transient operation with exponential backoff.
///
/// Used for auxiliary-input retrieval (tide-model archive, classification
/// layer), where failures are usually transient. Deterministic computation
/// failures must not be routed through this.
pub fn retry_with_backoff<T, F>(
    attempts: usize,
    base_delay: Duration,
    what: &str,
    mut op: F,
) -> ShoreResult<T>
where
    F: FnMut() -> ShoreResult<T>,
{
    let mut delay = base_delay;
    let mut last_err = None;

    for attempt in 1..=attempts.max(1) {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                last_err = Some(e);
                if attempt < attempts {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ShoreError::Processing(format!("{}: no attempts were made", what))
    }))
}
