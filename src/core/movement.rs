//! Cross-shore movement measurement.
//!
//! For every baseline point, casts a ray along the local shore-normal
//! against each year's contour and records the signed distance to the
//! nearest crossing. Contours travel with water on the left, so the
//! tangent rotated +90° (counter-clockwise) points seaward and positive
//! distances mean seaward movement.

use crate::types::{BaselinePoint, ContourSet, PointRecord, ShoreResult};
use geo::Coord;
use std::collections::BTreeMap;

/// Movement measurement parameters
#[derive(Debug, Clone)]
pub struct MovementParams {
    /// First calendar year of the analysis window (inclusive)
    pub start_year: i32,
    /// Last calendar year of the analysis window (inclusive)
    pub end_year: i32,
    /// Year whose contour the points were sampled from
    pub baseline_year: i32,
    /// Longest accepted crossing distance, in world units
    pub max_distance: f64,
}

impl Default for MovementParams {
    fn default() -> Self {
        Self {
            start_year: 1988,
            end_year: 2021,
            baseline_year: 2021,
            max_distance: 5000.0,
        }
    }
}

/// One accepted ray crossing
struct Crossing {
    /// Signed offset along the seaward normal
    distance: f64,
    /// Bearing of the normal relative to the crossed segment, degrees
    angle: f64,
}

/// Shore-normal movement measurer
pub struct MovementMeasurer {
    params: MovementParams,
}

impl MovementMeasurer {
    pub fn new(params: MovementParams) -> Self {
        Self { params }
    }

    /// Measure yearly distances for every baseline point.
    ///
    /// Every year of the analysis window gets an entry, so the distance
    /// map (and the columns derived from it downstream) has a fixed shape
    /// across points, tiles and runs. The baseline year is 0.0 by
    /// assignment. Years with no traced contour, and years whose contour
    /// the ray misses (or only hits beyond `max_distance`), record NaN.
    /// Regression statistics are left unset for a later pass.
    pub fn measure(
        &self,
        points: &[BaselinePoint],
        contours: &ContourSet,
    ) -> ShoreResult<Vec<PointRecord>> {
        log::info!(
            "Measuring movement for {} points against {} yearly contours",
            points.len(),
            contours.len()
        );

        let mut records = Vec::with_capacity(points.len());

        for (i, point) in points.iter().enumerate() {
            let normal = self.seaward_normal(points, i);
            let mut distances = BTreeMap::new();
            let mut angles = Vec::new();

            for year in self.params.start_year..=self.params.end_year {
                if year == self.params.baseline_year {
                    distances.insert(year, 0.0);
                    continue;
                }
                let (Some(contour), Some(n)) = (contours.get(&year), normal) else {
                    distances.insert(year, f64::NAN);
                    continue;
                };
                match self.nearest_crossing(point, n, contour) {
                    Some(crossing) => {
                        distances.insert(year, crossing.distance);
                        angles.push(crossing.angle);
                    }
                    None => {
                        distances.insert(year, f64::NAN);
                    }
                }
            }

            let (angle_mean, angle_std) = mean_std(&angles);
            records.push(PointRecord {
                base: point.clone(),
                distances,
                angle_mean,
                angle_std,
                stats: None,
            });
        }

        Ok(records)
    }

    /// Unit seaward normal at point `i`, from the tangent between
    /// neighbouring sampled points on the same component. Central
    /// difference in the interior, one-sided at component ends. `None`
    /// for isolated points.
    fn seaward_normal(&self, points: &[BaselinePoint], i: usize) -> Option<(f64, f64)> {
        let component = points[i].component;
        let prev = (i > 0 && points[i - 1].component == component).then(|| i - 1);
        let next =
            (i + 1 < points.len() && points[i + 1].component == component).then(|| i + 1);

        let (a, b) = match (prev, next) {
            (Some(p), Some(n)) => (p, n),
            (Some(p), None) => (p, i),
            (None, Some(n)) => (i, n),
            (None, None) => return None,
        };

        let tx = points[b].location.x() - points[a].location.x();
        let ty = points[b].location.y() - points[a].location.y();
        let len = (tx * tx + ty * ty).sqrt();
        if len == 0.0 {
            return None;
        }

        // Water on the left of travel: +90° rotation points seaward
        Some((-ty / len, tx / len))
    }

    /// Nearest contour crossing along the normal line, either direction
    fn nearest_crossing(
        &self,
        point: &BaselinePoint,
        normal: (f64, f64),
        contour: &crate::types::Contour,
    ) -> Option<Crossing> {
        let p = Coord {
            x: point.location.x(),
            y: point.location.y(),
        };
        let mut best: Option<Crossing> = None;

        for line in &contour.0 {
            for pair in line.0.windows(2) {
                let Some(crossing) = ray_crossing(p, normal, pair[0], pair[1]) else {
                    continue;
                };
                if crossing.distance.abs() > self.params.max_distance {
                    continue;
                }
                let closer = best
                    .as_ref()
                    .map(|b| crossing.distance.abs() < b.distance.abs())
                    .unwrap_or(true);
                if closer {
                    best = Some(crossing);
                }
            }
        }

        best
    }
}

/// Intersect the line through `p` along `n` with segment `a`-`b`.
///
/// Returns the signed offset along `n` and the bearing of `n` relative
/// to the segment direction, or `None` when parallel or outside the
/// segment.
fn ray_crossing(p: Coord<f64>, n: (f64, f64), a: Coord<f64>, b: Coord<f64>) -> Option<Crossing> {
    let ab = (b.x - a.x, b.y - a.y);
    let w = (a.x - p.x, a.y - p.y);

    let denom = cross(n, ab);
    if denom.abs() < 1e-12 {
        return None;
    }

    let s = cross(w, ab) / denom;
    let u = cross(w, n) / denom;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let angle = cross(ab, n).atan2(dot(ab, n)).to_degrees();
    let angle = if angle < 0.0 { angle + 360.0 } else { angle };

    Some(Crossing { distance: s, angle })
}

fn cross(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.1 - a.1 * b.0
}

fn dot(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.0 + a.1 * b.1
}

/// Arithmetic mean and population standard deviation
fn mean_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(var.sqrt()))
}
