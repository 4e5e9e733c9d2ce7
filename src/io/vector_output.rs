//! GeoJSON vector output.
//!
//! Serializes merged results into two FeatureCollections: annual
//! shorelines (one MultiLineString feature per year) and rates-of-change
//! points (one Point feature per record). The per-year distance map is
//! exploded into `dist_<year>` columns only here; everything upstream
//! keeps the year-keyed mapping. NaN distances become JSON nulls.

use crate::types::{MergedOutput, PointRecord, ShoreResult};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Vector product writer
pub struct VectorWriter;

impl VectorWriter {
    /// Write both products into a directory:
    /// `rates_of_change.geojson` and `shorelines_annual.geojson`.
    pub fn write_merged<P: AsRef<Path>>(dir: P, output: &MergedOutput) -> ShoreResult<()> {
        std::fs::create_dir_all(dir.as_ref())?;

        let points_path = dir.as_ref().join("rates_of_change.geojson");
        let contours_path = dir.as_ref().join("shorelines_annual.geojson");

        log::info!(
            "Writing {} point features to {}",
            output.points.len(),
            points_path.display()
        );
        let file = File::create(&points_path)?;
        serde_json::to_writer(BufWriter::new(file), &Self::points_collection(output))?;

        log::info!(
            "Writing {} shoreline years to {}",
            output.contours.len(),
            contours_path.display()
        );
        let file = File::create(&contours_path)?;
        serde_json::to_writer(BufWriter::new(file), &Self::contours_collection(output))?;

        Ok(())
    }

    /// Rates-of-change points as a FeatureCollection
    pub fn points_collection(output: &MergedOutput) -> Value {
        let features: Vec<Value> = output.points.iter().map(point_feature).collect();
        collection(output, features)
    }

    /// Annual shorelines as a FeatureCollection, one feature per year
    pub fn contours_collection(output: &MergedOutput) -> Value {
        let features: Vec<Value> = output
            .contours
            .iter()
            .map(|(&year, contour)| {
                let lines: Vec<Vec<[f64; 2]>> = contour
                    .0
                    .iter()
                    .map(|line| line.0.iter().map(|c| [c.x, c.y]).collect())
                    .collect();
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "MultiLineString",
                        "coordinates": lines,
                    },
                    "properties": { "year": year },
                })
            })
            .collect();
        collection(output, features)
    }
}

fn collection(output: &MergedOutput, features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "crs": {
            "type": "name",
            "properties": { "name": output.crs.to_string() },
        },
        "properties": { "output_version": output.output_version },
        "features": features,
    })
}

fn point_feature(record: &PointRecord) -> Value {
    let mut props = Map::new();
    props.insert("uid".to_string(), json!(record.base.id));
    props.insert("chainage".to_string(), json!(record.base.chainage));

    for (&year, &distance) in &record.distances {
        props.insert(format!("dist_{}", year), num(distance));
    }

    props.insert("angle_mean".to_string(), opt_num(record.angle_mean));
    props.insert("angle_std".to_string(), opt_num(record.angle_std));

    if let Some(stats) = &record.stats {
        props.insert("rate_time".to_string(), opt_num(stats.rate_of_change));
        props.insert("se_time".to_string(), opt_num(stats.std_err));
        props.insert("valid_obs".to_string(), json!(stats.valid_obs));
        props.insert("valid_span".to_string(), opt_int(stats.valid_span));
        props.insert("sce".to_string(), opt_num(stats.sce));
        props.insert("nsm".to_string(), opt_num(stats.nsm));
        props.insert("max_year".to_string(), opt_int(stats.max_year));
        props.insert("min_year".to_string(), opt_int(stats.min_year));
    }

    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [record.base.location.x(), record.base.location.y()],
        },
        "properties": Value::Object(props),
    })
}

/// Finite numbers serialize as numbers, NaN/inf as null
fn num(v: f64) -> Value {
    if v.is_finite() {
        json!(v)
    } else {
        Value::Null
    }
}

fn opt_num(v: Option<f64>) -> Value {
    v.map(num).unwrap_or(Value::Null)
}

fn opt_int(v: Option<i32>) -> Value {
    v.map(|i| json!(i)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselinePoint, ContourSet, Crs, RegressionStats};
    use geo::{LineString, MultiLineString, Point};
    use std::collections::BTreeMap;

    fn sample_output() -> MergedOutput {
        let mut distances = BTreeMap::new();
        distances.insert(2020, 0.0);
        distances.insert(2021, 30.0);
        distances.insert(2022, f64::NAN);

        let record = PointRecord {
            base: BaselinePoint {
                id: 3,
                location: Point::new(500_100.0, 6_000_000.0),
                component: 0,
                chainage: 90.0,
            },
            distances,
            angle_mean: Some(90.0),
            angle_std: Some(1.5),
            stats: Some(RegressionStats {
                rate_of_change: Some(30.0),
                intercept: Some(-60600.0),
                std_err: None,
                valid_obs: 2,
                valid_span: Some(1),
                sce: Some(30.0),
                nsm: Some(30.0),
                max_year: Some(2021),
                min_year: Some(2020),
            }),
        };

        let mut contours = ContourSet::new();
        contours.insert(
            2020,
            MultiLineString::new(vec![LineString::from(vec![
                (500_000.0, 6_000_000.0),
                (500_300.0, 6_000_000.0),
            ])]),
        );

        MergedOutput {
            crs: Crs::Utm { zone: 50, northern: false },
            output_version: "2.0.0".to_string(),
            points: vec![record],
            contours,
        }
    }

    #[test]
    fn test_point_properties() {
        let value = VectorWriter::points_collection(&sample_output());
        let props = &value["features"][0]["properties"];

        assert_eq!(props["uid"], 3);
        assert_eq!(props["dist_2020"], 0.0);
        assert_eq!(props["dist_2021"], 30.0);
        assert!(props["dist_2022"].is_null());
        assert_eq!(props["rate_time"], 30.0);
        assert_eq!(props["valid_obs"], 2);
        assert_eq!(props["max_year"], 2021);
        assert!(props["se_time"].is_null());
    }

    #[test]
    fn test_collection_header() {
        let value = VectorWriter::points_collection(&sample_output());
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], "EPSG:32750");
        assert_eq!(value["properties"]["output_version"], "2.0.0");
    }

    #[test]
    fn test_contour_features() {
        let value = VectorWriter::contours_collection(&sample_output());
        let feature = &value["features"][0];
        assert_eq!(feature["properties"]["year"], 2020);
        assert_eq!(
            feature["geometry"]["coordinates"][0][1][0],
            500_300.0
        );
    }

    #[test]
    fn test_write_merged_creates_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        VectorWriter::write_merged(dir.path(), &sample_output()).expect("write");
        assert!(dir.path().join("rates_of_change.geojson").exists());
        assert!(dir.path().join("shorelines_annual.geojson").exists());

        let text =
            std::fs::read_to_string(dir.path().join("rates_of_change.geojson")).expect("read");
        let parsed: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(parsed["features"].as_array().map(|f| f.len()), Some(1));
    }
}
