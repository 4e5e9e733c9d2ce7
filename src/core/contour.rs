//! Sub-pixel shoreline contour extraction.
//!
//! Traces the water-index threshold crossing through each yearly composite
//! with a marching-squares pass over pixel centers, interpolating crossing
//! positions linearly between pixels. Emitted segments are directed so
//! that water (index >= threshold) lies on the LEFT of the travel
//! direction in world coordinates; the movement measurer relies on this
//! to fix the seaward sign convention.

use crate::types::{CompositeRaster, Contour, ContourSet, ShoreResult};
use geo::{Coord, LineString, MultiLineString};
use std::collections::HashMap;

/// Contour extraction parameters
#[derive(Debug, Clone)]
pub struct ContourParams {
    /// Water index threshold to trace
    pub threshold: f32,
    /// Minimum vertex count for a line or ring to qualify
    pub min_vertices: usize,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            min_vertices: 10,
        }
    }
}

/// A directed contour segment in pixel-center coordinates
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: (f64, f64),
    end: (f64, f64),
}

/// Sub-pixel contour extractor
pub struct ContourExtractor {
    params: ContourParams,
}

impl ContourExtractor {
    pub fn new(params: ContourParams) -> Self {
        Self { params }
    }

    /// Extract the contour for one composite year.
    ///
    /// Returns `None` when no traced line meets the minimum vertex count;
    /// the year is then an explicit gap, not a zero-length contour.
    pub fn extract(&self, composite: &CompositeRaster) -> ShoreResult<Option<Contour>> {
        log::debug!(
            "Tracing contour at threshold {} for year {}",
            self.params.threshold,
            composite.year
        );

        let segments = self.march(composite);
        if segments.is_empty() {
            log::debug!("Year {}: no threshold crossings", composite.year);
            return Ok(None);
        }

        let chains = stitch_segments(&segments);
        let transform = &composite.geometry.transform;

        let mut lines = Vec::new();
        for chain in chains {
            if chain.len() < self.params.min_vertices {
                continue;
            }
            let coords: Vec<Coord<f64>> = chain
                .iter()
                .map(|&(px, py)| {
                    // Pixel-center (col, row) to world coordinates
                    let (x, y) = transform.pixel_to_world(px + 0.5, py + 0.5);
                    Coord { x, y }
                })
                .collect();
            lines.push(LineString::new(coords));
        }

        if lines.is_empty() {
            log::debug!(
                "Year {}: all traced lines below {} vertices",
                composite.year,
                self.params.min_vertices
            );
            return Ok(None);
        }

        log::debug!("Year {}: {} contour lines", composite.year, lines.len());
        Ok(Some(MultiLineString::new(lines)))
    }

    /// Extract contours for every composite; years with no qualifying
    /// geometry are simply absent from the mapping.
    pub fn extract_all(&self, composites: &[CompositeRaster]) -> ShoreResult<ContourSet> {
        let mut contours = ContourSet::new();
        for composite in composites {
            if let Some(contour) = self.extract(composite)? {
                contours.insert(composite.year, contour);
            } else {
                log::info!(
                    "Year {}: contour extraction produced no qualifying geometry",
                    composite.year
                );
            }
        }
        log::info!(
            "Extracted contours for {}/{} years",
            contours.len(),
            composites.len()
        );
        Ok(contours)
    }

    /// Marching squares over 2x2 pixel-center cells.
    ///
    /// Cell corners are the composite values at (r,c), (r,c+1), (r+1,c+1),
    /// (r+1,c); any NaN corner suppresses the cell. Inside = value >=
    /// threshold.
    fn march(&self, composite: &CompositeRaster) -> Vec<Segment> {
        let (rows, cols) = composite.index.dim();
        if rows < 2 || cols < 2 {
            return Vec::new();
        }

        let t = self.params.threshold;
        let mut segments = Vec::new();

        for r in 0..rows - 1 {
            for c in 0..cols - 1 {
                let a = composite.index[[r, c]]; // top-left
                let b = composite.index[[r, c + 1]]; // top-right
                let d = composite.index[[r + 1, c + 1]]; // bottom-right
                let e = composite.index[[r + 1, c]]; // bottom-left

                if a.is_nan() || b.is_nan() || d.is_nan() || e.is_nan() {
                    continue;
                }

                let case = ((a >= t) as usize) << 3
                    | ((b >= t) as usize) << 2
                    | ((d >= t) as usize) << 1
                    | ((e >= t) as usize);

                if case == 0 || case == 15 {
                    continue;
                }

                let x = c as f64;
                let y = r as f64;
                // Edge crossing points, linearly interpolated
                let top = || (x + frac(a, b, t), y);
                let right = || (x + 1.0, y + frac(b, d, t));
                let bottom = || (x + frac(e, d, t), y + 1.0);
                let left = || (x, y + frac(a, e, t));

                // Directed so water is on the left in world coordinates
                // (north-up transform; row+ is south)
                match case {
                    1 => segments.push(seg(bottom(), left())),
                    2 => segments.push(seg(right(), bottom())),
                    3 => segments.push(seg(right(), left())),
                    4 => segments.push(seg(top(), right())),
                    5 => {
                        // Saddle: disambiguate with the center average
                        if (a + b + d + e) / 4.0 >= t {
                            segments.push(seg(top(), left()));
                            segments.push(seg(bottom(), right()));
                        } else {
                            segments.push(seg(top(), right()));
                            segments.push(seg(bottom(), left()));
                        }
                    }
                    6 => segments.push(seg(top(), bottom())),
                    7 => segments.push(seg(top(), left())),
                    8 => segments.push(seg(left(), top())),
                    9 => segments.push(seg(bottom(), top())),
                    10 => {
                        if (a + b + d + e) / 4.0 >= t {
                            segments.push(seg(right(), top()));
                            segments.push(seg(left(), bottom()));
                        } else {
                            segments.push(seg(left(), top()));
                            segments.push(seg(right(), bottom()));
                        }
                    }
                    11 => segments.push(seg(right(), top())),
                    12 => segments.push(seg(left(), right())),
                    13 => segments.push(seg(bottom(), right())),
                    14 => segments.push(seg(left(), bottom())),
                    _ => unreachable!(),
                }
            }
        }

        segments
    }
}

fn seg(start: (f64, f64), end: (f64, f64)) -> Segment {
    Segment { start, end }
}

/// Interpolation fraction of the threshold crossing from `v0` toward `v1`
fn frac(v0: f32, v1: f32, threshold: f32) -> f64 {
    let denom = (v1 - v0) as f64;
    if denom.abs() < f64::EPSILON {
        0.5
    } else {
        (((threshold - v0) as f64) / denom).clamp(0.0, 1.0)
    }
}

/// Quantization key for endpoint matching
fn key(p: (f64, f64)) -> (i64, i64) {
    const SCALE: f64 = 1_048_576.0;
    ((p.0 * SCALE).round() as i64, (p.1 * SCALE).round() as i64)
}

/// Stitch directed segments into polylines.
///
/// Segments are consumed in emission (scan) order and chains extend
/// forward from each unused segment, so output ordering is deterministic
/// for a given raster. Chains that return to their starting point close
/// as rings (first vertex == last vertex).
fn stitch_segments(segments: &[Segment]) -> Vec<Vec<(f64, f64)>> {
    // start-point key -> segment indices, in emission order
    let mut by_start: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, s) in segments.iter().enumerate() {
        by_start.entry(key(s.start)).or_default().push(i);
    }
    let mut used = vec![false; segments.len()];
    let mut chains = Vec::new();

    for i in 0..segments.len() {
        if used[i] {
            continue;
        }
        used[i] = true;

        let mut chain = vec![segments[i].start, segments[i].end];
        let start_key = key(segments[i].start);

        // Extend forward until the chain closes or dead-ends
        loop {
            let Some(&tail) = chain.last() else { break };
            let end_key = key(tail);
            if end_key == start_key {
                break; // closed ring
            }
            let Some(candidates) = by_start.get_mut(&end_key) else {
                break;
            };
            let next = candidates.iter().position(|&j| !used[j]);
            let Some(pos) = next else { break };
            let j = candidates[pos];
            used[j] = true;
            chain.push(segments[j].end);
        }

        chains.push(chain);
    }

    // A chain that dead-ended may continue backwards from its start (the
    // scan can begin mid-line). Join chain pairs where one's end meets
    // another's start.
    merge_open_chains(chains)
}

fn merge_open_chains(mut chains: Vec<Vec<(f64, f64)>>) -> Vec<Vec<(f64, f64)>> {
    loop {
        let mut merged_any = false;
        'outer: for i in 0..chains.len() {
            if chains[i].is_empty() {
                continue;
            }
            let end_i = key(chains[i][chains[i].len() - 1]);
            let start_i = key(chains[i][0]);
            if end_i == start_i {
                continue; // closed
            }
            for j in 0..chains.len() {
                if i == j || chains[j].is_empty() {
                    continue;
                }
                if key(chains[j][0]) == end_i {
                    let tail: Vec<_> = chains[j].drain(1..).collect();
                    chains[j].clear();
                    chains[i].extend(tail);
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            break;
        }
    }
    chains.retain(|c| !c.is_empty());
    chains
}
