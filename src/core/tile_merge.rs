//! Merging of per-tile outputs into one continuous product.
//!
//! Adjacent tiles are processed with an overlap margin, so their outputs
//! duplicate geometry near shared edges. The merger reprojects every tile
//! into the target coordinate system, then resolves overlap with a fixed
//! priority: tiles are visited in ascending `tile_id` order and later
//! tiles yield to earlier ones inside the overlap buffer.

use crate::core::projection::reproject_point;
use crate::types::{
    BoundingBox, ContourSet, Crs, MergedOutput, PointRecord, ShoreError, ShoreResult,
    TileOutput,
};
use geo::{Coord, LineString, MultiLineString, Point};
use std::collections::HashMap;

/// Tile merge parameters
#[derive(Debug, Clone)]
pub struct TileMergeParams {
    /// Coordinate system of the merged product
    pub target_crs: Crs,
    /// Version string stamped on the merged output
    pub output_version: String,
    /// Overlap resolution distance in target-CRS units
    pub overlap_buffer: f64,
}

impl Default for TileMergeParams {
    fn default() -> Self {
        Self {
            target_crs: Crs::Geographic,
            output_version: "1.0.0".to_string(),
            overlap_buffer: 60.0,
        }
    }
}

/// Spatial hash for accepted-point neighbourhood lookups
struct PointIndex {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<(f64, f64)>>,
}

impl PointIndex {
    fn new(cell: f64) -> Self {
        Self {
            cell: cell.max(f64::MIN_POSITIVE),
            cells: HashMap::new(),
        }
    }

    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        ((x / self.cell).floor() as i64, (y / self.cell).floor() as i64)
    }

    fn insert(&mut self, x: f64, y: f64) {
        let key = self.key(x, y);
        self.cells.entry(key).or_default().push((x, y));
    }

    /// Any accepted point within `radius` of (x, y)?
    fn has_neighbor(&self, x: f64, y: f64, radius: f64) -> bool {
        let (cx, cy) = self.key(x, y);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(points) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &(px, py) in points {
                    let d2 = (px - x).powi(2) + (py - y).powi(2);
                    if d2 <= radius * radius {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Tile output merger
pub struct TileMerger {
    params: TileMergeParams,
}

impl TileMerger {
    pub fn new(params: TileMergeParams) -> Self {
        Self { params }
    }

    /// Merge tile outputs into one product in the target CRS.
    ///
    /// Empty tiles are skipped with a warning; if nothing remains the
    /// merge fails with `MergeFatal`. Point ids are renumbered in
    /// acceptance order so the merged set stays collision-free.
    pub fn merge(&self, mut tiles: Vec<TileOutput>) -> ShoreResult<MergedOutput> {
        let total = tiles.len();
        tiles.retain(|t| {
            if t.is_empty() {
                log::warn!("Skipping empty tile {}", t.tile_id);
                false
            } else {
                true
            }
        });
        if tiles.is_empty() {
            return Err(ShoreError::MergeFatal(format!(
                "All {} tiles were empty",
                total
            )));
        }

        // Ascending tile id fixes overlap priority
        tiles.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
        log::info!(
            "Merging {} tiles into {} (buffer {})",
            tiles.len(),
            self.params.target_crs,
            self.params.overlap_buffer
        );

        let buffer = self.params.overlap_buffer;
        let mut index = PointIndex::new(buffer.max(1.0));
        let mut accepted_footprints: Vec<BoundingBox> = Vec::new();
        let mut points: Vec<PointRecord> = Vec::new();
        let mut contours = ContourSet::new();
        let mut next_id = 0usize;

        for tile in tiles {
            let mut kept = 0usize;
            let mut dropped = 0usize;

            // The buffer only arbitrates BETWEEN tiles; points within one
            // tile may sit closer together than the buffer
            let mut tile_points = Vec::new();

            for record in &tile.points {
                let (x, y) = reproject_point(
                    tile.geometry.crs,
                    self.params.target_crs,
                    record.base.location.x(),
                    record.base.location.y(),
                );
                if index.has_neighbor(x, y, buffer) {
                    dropped += 1;
                    continue;
                }
                tile_points.push((x, y));

                let mut merged = record.clone();
                merged.base.id = next_id;
                merged.base.location = Point::new(x, y);
                next_id += 1;
                points.push(merged);
                kept += 1;
            }

            for (x, y) in tile_points {
                index.insert(x, y);
            }

            for (&year, contour) in &tile.contours {
                let reprojected = self.reproject_contour(tile.geometry.crs, contour);
                let clipped = clip_against_footprints(&reprojected, &accepted_footprints);
                if clipped.0.is_empty() {
                    continue;
                }
                contours
                    .entry(year)
                    .or_insert_with(|| MultiLineString::new(Vec::new()))
                    .0
                    .extend(clipped.0);
            }

            accepted_footprints.push(self.reproject_extent(&tile).shrink(buffer));
            log::debug!(
                "Tile {}: kept {} points, dropped {} in overlap",
                tile.tile_id,
                kept,
                dropped
            );
        }

        log::info!(
            "Merge complete: {} points, {} contour years",
            points.len(),
            contours.len()
        );
        Ok(MergedOutput {
            crs: self.params.target_crs,
            output_version: self.params.output_version.clone(),
            points,
            contours,
        })
    }

    fn reproject_contour(&self, from: Crs, contour: &MultiLineString<f64>) -> MultiLineString<f64> {
        let lines = contour
            .0
            .iter()
            .map(|line| {
                LineString::new(
                    line.0
                        .iter()
                        .map(|c| {
                            let (x, y) =
                                reproject_point(from, self.params.target_crs, c.x, c.y);
                            Coord { x, y }
                        })
                        .collect(),
                )
            })
            .collect();
        MultiLineString::new(lines)
    }

    /// Tile extent in the target CRS, via its reprojected corners
    fn reproject_extent(&self, tile: &TileOutput) -> BoundingBox {
        let ext = tile.geometry.extent();
        let corners = [
            (ext.min_x, ext.min_y),
            (ext.min_x, ext.max_y),
            (ext.max_x, ext.min_y),
            (ext.max_x, ext.max_y),
        ];
        let mut out = BoundingBox {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            let (tx, ty) = reproject_point(tile.geometry.crs, self.params.target_crs, x, y);
            out.min_x = out.min_x.min(tx);
            out.max_x = out.max_x.max(tx);
            out.min_y = out.min_y.min(ty);
            out.max_y = out.max_y.max(ty);
        }
        out
    }
}

/// Drop vertex runs falling inside any earlier tile's core footprint;
/// surviving runs shorter than two vertices vanish.
fn clip_against_footprints(
    contour: &MultiLineString<f64>,
    footprints: &[BoundingBox],
) -> MultiLineString<f64> {
    if footprints.is_empty() {
        return contour.clone();
    }

    let mut lines = Vec::new();
    for line in &contour.0 {
        let mut run: Vec<Coord<f64>> = Vec::new();
        for &coord in &line.0 {
            let covered = footprints.iter().any(|f| f.contains(coord.x, coord.y));
            if covered {
                if run.len() >= 2 {
                    lines.push(LineString::new(std::mem::take(&mut run)));
                } else {
                    run.clear();
                }
            } else {
                run.push(coord);
            }
        }
        if run.len() >= 2 {
            lines.push(LineString::new(run));
        }
    }
    MultiLineString::new(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselinePoint, GeoTransform, GridGeometry};
    use std::collections::BTreeMap;

    fn utm_crs() -> Crs {
        Crs::Utm { zone: 55, northern: false }
    }

    fn tile_geom(origin_x: f64, cols: usize) -> GridGeometry {
        GridGeometry {
            transform: GeoTransform::north_up(origin_x, 300.0, 30.0),
            crs: utm_crs(),
            rows: 10,
            cols,
        }
    }

    fn point_record(id: usize, x: f64, y: f64) -> PointRecord {
        PointRecord {
            base: BaselinePoint {
                id,
                location: Point::new(x, y),
                component: 0,
                chainage: 0.0,
            },
            distances: BTreeMap::new(),
            angle_mean: None,
            angle_std: None,
            stats: None,
        }
    }

    fn tile(tile_id: &str, origin_x: f64, points: Vec<PointRecord>) -> TileOutput {
        TileOutput {
            tile_id: tile_id.to_string(),
            geometry: tile_geom(origin_x, 10),
            points,
            contours: ContourSet::new(),
        }
    }

    fn merger(buffer: f64) -> TileMerger {
        TileMerger::new(TileMergeParams {
            target_crs: utm_crs(),
            output_version: "2.0.0".to_string(),
            overlap_buffer: buffer,
        })
    }

    #[test]
    fn test_overlap_points_deduplicated() {
        // Both tiles report a point near x=290; tile a wins
        let a = tile("x55y01", 0.0, vec![point_record(0, 290.0, 150.0)]);
        let b = tile(
            "x55y02",
            270.0,
            vec![point_record(0, 295.0, 150.0), point_record(1, 500.0, 150.0)],
        );

        let merged = merger(60.0).merge(vec![b, a]).expect("merge");
        assert_eq!(merged.points.len(), 2);
        // Earlier tile's point survived at its own position
        assert_eq!(merged.points[0].base.location.x(), 290.0);
        assert_eq!(merged.points[1].base.location.x(), 500.0);
    }

    #[test]
    fn test_merged_ids_renumbered() {
        let a = tile("a", 0.0, vec![point_record(7, 10.0, 10.0)]);
        let b = tile("b", 1000.0, vec![point_record(7, 1500.0, 10.0)]);

        let merged = merger(60.0).merge(vec![a, b]).expect("merge");
        let ids: Vec<usize> = merged.points.iter().map(|p| p.base.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_all_empty_is_fatal() {
        let empty = tile("a", 0.0, vec![]);
        let result = merger(60.0).merge(vec![empty]);
        assert!(matches!(result, Err(ShoreError::MergeFatal(_))));
    }

    #[test]
    fn test_empty_tile_skipped() {
        let empty = tile("a", 0.0, vec![]);
        let full = tile("b", 0.0, vec![point_record(0, 10.0, 10.0)]);
        let merged = merger(60.0).merge(vec![empty, full]).expect("merge");
        assert_eq!(merged.points.len(), 1);
    }

    #[test]
    fn test_later_contours_clipped_in_overlap() {
        // Tile a spans x 0..300; tile b's contour reaches back into it
        let mut a = tile("a", 0.0, vec![point_record(0, 10.0, 150.0)]);
        a.contours.insert(
            2020,
            MultiLineString::new(vec![LineString::from(vec![
                (0.0, 150.0),
                (290.0, 150.0),
            ])]),
        );
        let mut b = tile("b", 270.0, vec![]);
        b.contours.insert(
            2020,
            MultiLineString::new(vec![LineString::from(vec![
                (100.0, 140.0),
                (200.0, 140.0),
                (400.0, 140.0),
                (500.0, 140.0),
            ])]),
        );

        let merged = merger(10.0).merge(vec![a, b]).expect("merge");
        let contour = &merged.contours[&2020];
        assert_eq!(contour.0.len(), 2);
        // Tile b's vertices inside tile a's core footprint are gone
        let clipped = &contour.0[1];
        assert!(clipped.0.iter().all(|c| c.x >= 290.0 - 10.0));
        assert_eq!(clipped.0.len(), 2);
    }

    #[test]
    fn test_reprojection_to_geographic() {
        // Point on the zone 55 central meridian
        let t = tile("a", 0.0, vec![point_record(0, 500_000.0, 5_000_000.0)]);
        let merger = TileMerger::new(TileMergeParams {
            target_crs: Crs::Geographic,
            output_version: "2.0.0".to_string(),
            overlap_buffer: 0.001,
        });
        let merged = merger.merge(vec![t]).expect("merge");
        let p = &merged.points[0].base.location;
        assert!((p.x() - 147.0).abs() < 1e-6, "lon {}", p.x());
        assert!(p.y() < 0.0, "southern hemisphere lat {}", p.y());
    }
}
