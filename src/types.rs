use chrono::{DateTime, Datelike, Utc};
use geo::{MultiLineString, Point};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Water-index raster (NDWI/MNDWI-style values, NaN = no data)
pub type IndexImage = Array2<f32>;

/// Boolean validity / classification raster
pub type MaskImage = Array2<bool>;

/// Per-pixel observation counts
pub type CountImage = Array2<u16>;

/// Per-year shoreline geometry in world coordinates
pub type Contour = MultiLineString<f64>;

/// Year-indexed contour mapping; absent years are explicit gaps
pub type ContourSet = BTreeMap<i32, Contour>;

/// Coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic coordinates (latitude, longitude, WGS84)
    Geographic,
    /// Universal Transverse Mercator zone
    Utm { zone: u8, northern: bool },
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crs::Geographic => write!(f, "EPSG:4326"),
            Crs::Utm { zone, northern } => {
                let base = if *northern { 32600 } else { 32700 };
                write!(f, "EPSG:{}", base + *zone as u32)
            }
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels (pixel_height is negative)
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Convert fractional pixel coordinates (col, row) to world (x, y).
    /// Pixel (0.0, 0.0) maps to the top-left corner of the raster.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Convert world (x, y) to fractional pixel coordinates (col, row).
    /// Only valid for north-up transforms (zero rotation terms).
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (col, row)
    }
}

/// Axis-aligned extent in world coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Shrink the box inward by `margin` on every side
    pub fn shrink(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x + margin,
            max_x: self.max_x - margin,
            min_y: self.min_y + margin,
            max_y: self.max_y - margin,
        }
    }
}

/// Raster grid geometry shared by all observations of a tile
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry {
    pub transform: GeoTransform,
    pub crs: Crs,
    pub rows: usize,
    pub cols: usize,
}

impl GridGeometry {
    /// World-coordinate extent covered by the grid
    pub fn extent(&self) -> BoundingBox {
        let (x0, y0) = self.transform.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self
            .transform
            .pixel_to_world(self.cols as f64, self.rows as f64);
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

/// One satellite scene: per-pixel water-index values plus quality mask.
/// Immutable once ingested.
#[derive(Debug, Clone)]
pub struct Observation {
    pub time: DateTime<Utc>,
    pub index: IndexImage,
    pub quality: MaskImage,
}

impl Observation {
    pub fn year(&self) -> i32 {
        self.time.year()
    }
}

/// Full time series of observations for one tile
#[derive(Debug, Clone)]
pub struct ObservationStack {
    pub geometry: GridGeometry,
    pub observations: Vec<Observation>,
}

/// Modeled tide height associated with one observation
#[derive(Debug, Clone)]
pub struct TideHeight {
    /// Scene-representative tide height (meters relative to mean sea level)
    pub scene_height: f32,
    /// Optional full-resolution height grid (high-res mode only)
    pub grid: Option<Array2<f32>>,
}

/// Tide-filtered subset of an observation stack.
/// Constructed only by `TideFilter`, so membership is a subset by construction.
#[derive(Debug, Clone)]
pub struct FilteredStack {
    pub geometry: GridGeometry,
    pub observations: Vec<Observation>,
    /// Tide heights of the retained observations, index-aligned
    pub tide_heights: Vec<f32>,
}

/// Per-pixel provenance of composite values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Certainty {
    /// Median of direct observations from the target year
    Direct,
    /// Median over the centered gapfill window
    Gapfilled,
    /// No data even after gapfill
    NoData,
    /// Valid data removed by the coastal mask
    MaskedOut,
}

/// Per-year median composite with observation counts and certainty
#[derive(Debug, Clone)]
pub struct CompositeRaster {
    pub year: i32,
    pub geometry: GridGeometry,
    pub index: IndexImage,
    pub count: CountImage,
    pub certainty: Array2<Certainty>,
}

impl CompositeRaster {
    /// True when no pixel carries data, even after gapfill
    pub fn is_empty(&self) -> bool {
        !self
            .certainty
            .iter()
            .any(|c| matches!(c, Certainty::Direct | Certainty::Gapfilled))
    }
}

/// Point sampled at fixed arc length along the baseline-year contour.
/// Identity (id, ordering) is stable across re-runs.
#[derive(Debug, Clone)]
pub struct BaselinePoint {
    pub id: usize,
    pub location: Point<f64>,
    /// Index of the contour component the point was sampled from
    pub component: usize,
    /// Arc-length position along that component
    pub chainage: f64,
}

/// Baseline point extended with per-year movement and quality statistics
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub base: BaselinePoint,
    /// Signed distance from the baseline per year, positive = seaward.
    /// NaN marks a year where no intersection was found within bounds.
    pub distances: BTreeMap<i32, f64>,
    /// Mean bearing of yearly crossings relative to the local normal.
    /// `None` when no non-baseline year produced a crossing.
    pub angle_mean: Option<f64>,
    /// Standard deviation of those bearings
    pub angle_std: Option<f64>,
    /// Regression statistics, filled in by the stats engine
    pub stats: Option<RegressionStats>,
}

/// Per-point regression and summary statistics.
/// All `Option` fields are `None` when fewer than two valid years exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionStats {
    /// OLS slope of distance against calendar year (units per year)
    pub rate_of_change: Option<f64>,
    /// OLS intercept at year zero
    pub intercept: Option<f64>,
    /// Standard error of the slope estimate
    pub std_err: Option<f64>,
    /// Number of years with a measurable distance
    pub valid_obs: usize,
    /// Max valid year minus min valid year
    pub valid_span: Option<i32>,
    /// Shoreline Change Envelope: max - min distance across valid years
    pub sce: Option<f64>,
    /// Net Shoreline Movement: last valid distance minus first valid distance
    pub nsm: Option<f64>,
    /// Year of maximum distance
    pub max_year: Option<i32>,
    /// Year of minimum distance
    pub min_year: Option<i32>,
}

/// Complete per-tile result handed to the merger
#[derive(Debug, Clone)]
pub struct TileOutput {
    pub tile_id: String,
    pub geometry: GridGeometry,
    pub points: Vec<PointRecord>,
    pub contours: ContourSet,
}

impl TileOutput {
    /// A tile with neither points nor contours contributes nothing to a merge
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.contours.is_empty()
    }
}

/// Union of all tile outputs in the target coordinate system
#[derive(Debug, Clone)]
pub struct MergedOutput {
    pub crs: Crs,
    pub output_version: String,
    pub points: Vec<PointRecord>,
    pub contours: ContourSet,
}

/// Error types for shoreline processing
#[derive(Debug, thiserror::Error)]
pub enum ShoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("No usable input: {0}")]
    DataUnavailable(String),

    #[error("Nothing to merge: {0}")]
    MergeFatal(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for shoreline operations
pub type ShoreResult<T> = Result<T, ShoreError>;
