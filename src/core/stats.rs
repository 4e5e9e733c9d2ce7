//! Per-point change statistics.
//!
//! Fits an ordinary least squares trend of cross-shore distance against
//! calendar year for every point record and derives the envelope and
//! net-movement summaries. Years with NaN distances never enter the fit.

use crate::types::{PointRecord, RegressionStats, ShoreResult};

/// Change statistics engine
pub struct StatsEngine;

impl StatsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Attach regression statistics to every record in place.
    pub fn annotate(&self, records: &mut [PointRecord]) -> ShoreResult<()> {
        let mut fitted = 0usize;
        for record in records.iter_mut() {
            let stats = Self::compute(record);
            if stats.rate_of_change.is_some() {
                fitted += 1;
            }
            record.stats = Some(stats);
        }
        log::info!(
            "Fitted change rates for {}/{} points",
            fitted,
            records.len()
        );
        Ok(())
    }

    /// Statistics over a record's valid (finite) yearly distances.
    ///
    /// With fewer than two valid years only `valid_obs` is meaningful;
    /// every other field stays `None`.
    fn compute(record: &PointRecord) -> RegressionStats {
        let valid: Vec<(i32, f64)> = record
            .distances
            .iter()
            .filter(|(_, d)| d.is_finite())
            .map(|(&y, &d)| (y, d))
            .collect();

        let valid_obs = valid.len();
        if valid_obs < 2 {
            return RegressionStats {
                rate_of_change: None,
                intercept: None,
                std_err: None,
                valid_obs,
                valid_span: None,
                max_year: None,
                min_year: None,
                sce: None,
                nsm: None,
            };
        }

        let first_year = valid.first().map(|&(y, _)| y);
        let last_year = valid.last().map(|&(y, _)| y);
        let valid_span = match (first_year, last_year) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        };

        // Years of the most seaward and most landward positions
        let (min_year, min_d) = valid
            .iter()
            .cloned()
            .reduce(|a, b| if b.1 < a.1 { b } else { a })
            .map(|(y, d)| (Some(y), d))
            .unwrap_or((None, f64::NAN));
        let (max_year, max_d) = valid
            .iter()
            .cloned()
            .reduce(|a, b| if b.1 > a.1 { b } else { a })
            .map(|(y, d)| (Some(y), d))
            .unwrap_or((None, f64::NAN));
        let sce = Some(max_d - min_d);

        // Net movement: last valid year minus first valid year
        let nsm = match (valid.first(), valid.last()) {
            (Some(&(_, first)), Some(&(_, last))) => Some(last - first),
            _ => None,
        };

        let (slope, intercept, std_err) = ols(&valid);

        RegressionStats {
            rate_of_change: Some(slope),
            intercept: Some(intercept),
            std_err,
            valid_obs,
            valid_span,
            max_year,
            min_year,
            sce,
            nsm,
        }
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// OLS fit of distance on year. Returns (slope, intercept, slope std err);
/// the standard error needs at least one residual degree of freedom.
fn ols(samples: &[(i32, f64)]) -> (f64, f64, Option<f64>) {
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|&(x, _)| x as f64).sum::<f64>() / n;
    let mean_y = samples.iter().map(|&(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in samples {
        let dx = x as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let std_err = if samples.len() > 2 {
        let sse: f64 = samples
            .iter()
            .map(|&(x, y)| {
                let fit = intercept + slope * x as f64;
                (y - fit).powi(2)
            })
            .sum();
        let df = n - 2.0;
        Some((sse / df / sxx).sqrt())
    } else {
        None
    };

    (slope, intercept, std_err)
}
