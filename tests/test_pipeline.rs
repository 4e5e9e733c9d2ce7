//! End-to-end pipeline test on a synthetic two-year tile.
//!
//! A 10x10 grid of 30-unit pixels with the land/water transition at row 5
//! in 2020 and row 6 in 2021: the shoreline moves one pixel seaward, so
//! every sampled point should measure +30 units and a +30/yr trend.

use chrono::{TimeZone, Utc};
use ndarray::Array2;
use shoreline::core::TileMergeParams;
use shoreline::io::VectorWriter;
use shoreline::{
    AnalysisParams, Crs, GeoTransform, GridGeometry, Observation, ObservationStack,
    TideModelGrid, TileInput, TilePipeline,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn flat_tide_model() -> TideModelGrid {
    TideModelGrid {
        region: "test".to_string(),
        // Lon 100-130, lat -50..-20, zero amplitude everywhere
        transform: GeoTransform::north_up(100.0, -20.0, 10.0),
        m2_amplitude: Array2::zeros((3, 3)),
        m2_phase: Array2::zeros((3, 3)),
        s2_amplitude: Array2::zeros((3, 3)),
        s2_phase: Array2::zeros((3, 3)),
    }
}

fn shore_observation(year: i32, water_row: usize) -> Observation {
    let mut index = Array2::from_elem((10, 10), -1.0f32);
    for row in water_row..10 {
        for col in 0..10 {
            index[[row, col]] = 1.0;
        }
    }
    Observation {
        time: Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
        index,
        quality: Array2::from_elem((10, 10), true),
    }
}

fn two_year_tile() -> TileInput {
    TileInput {
        tile_id: "x50y01".to_string(),
        stack: ObservationStack {
            geometry: GridGeometry {
                transform: GeoTransform::north_up(500_000.0, 6_000_000.0, 30.0),
                crs: Crs::Utm { zone: 50, northern: false },
                rows: 10,
                cols: 10,
            },
            observations: vec![shore_observation(2020, 5), shore_observation(2021, 6)],
        },
        tide_model: flat_tide_model(),
        exclusions: Vec::new(),
        external_water: None,
    }
}

fn analysis() -> AnalysisParams {
    AnalysisParams {
        start_year: 2020,
        end_year: 2021,
        baseline_year: 2020,
        min_contour_vertices: 5,
        ..AnalysisParams::default()
    }
}

#[test]
fn test_two_year_scenario_distances() {
    init_logs();
    let pipeline = TilePipeline::new(analysis());
    let output = pipeline.run(two_year_tile()).expect("pipeline run");

    assert!(!output.points.is_empty(), "expected sampled points");
    assert!(output.contours.contains_key(&2020));
    assert!(output.contours.contains_key(&2021));

    for record in &output.points {
        assert_eq!(record.distances[&2020], 0.0, "baseline distance");
        let d = record.distances[&2021];
        assert!(
            (d - 30.0).abs() < 1e-6,
            "point {} measured {}, expected +30 (seaward)",
            record.base.id,
            d
        );
    }
}

#[test]
fn test_two_year_scenario_statistics() {
    let pipeline = TilePipeline::new(analysis());
    let output = pipeline.run(two_year_tile()).expect("pipeline run");

    for record in &output.points {
        let stats = record.stats.as_ref().expect("stats annotated");
        assert_eq!(stats.valid_obs, 2);
        let rate = stats.rate_of_change.expect("rate");
        assert!((rate - 30.0).abs() < 1e-6, "rate {}", rate);
        assert!((stats.nsm.expect("nsm") - 30.0).abs() < 1e-6);
        assert!((stats.sce.expect("sce") - 30.0).abs() < 1e-6);
        assert_eq!(stats.max_year, Some(2021));
        assert_eq!(stats.min_year, Some(2020));
    }
}

#[test]
fn test_two_year_scenario_baseline_geometry() {
    let pipeline = TilePipeline::new(analysis());
    let output = pipeline.run(two_year_tile()).expect("pipeline run");

    // 2020 waterline crosses between rows 4 and 5: world y = 5999850
    let baseline = &output.contours[&2020];
    for line in &baseline.0 {
        for coord in &line.0 {
            assert!(
                (coord.y - 5_999_850.0).abs() < 1e-6,
                "baseline vertex y {}",
                coord.y
            );
        }
    }
}

#[test]
fn test_merge_and_write_single_tile() {
    init_logs();
    let pipeline = TilePipeline::new(analysis());
    let merged = pipeline
        .run_and_merge(
            vec![two_year_tile()],
            TileMergeParams {
                target_crs: Crs::Utm { zone: 50, northern: false },
                output_version: "2.0.0".to_string(),
                overlap_buffer: 1.0,
            },
        )
        .expect("merge");

    assert!(!merged.points.is_empty());
    assert_eq!(merged.output_version, "2.0.0");

    let dir = tempfile::tempdir().expect("tempdir");
    VectorWriter::write_merged(dir.path(), &merged).expect("write");

    let text = std::fs::read_to_string(dir.path().join("rates_of_change.geojson"))
        .expect("read output");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("valid geojson");
    let props = &parsed["features"][0]["properties"];
    assert!((props["dist_2021"].as_f64().expect("dist") - 30.0).abs() < 1e-6);
    assert_eq!(parsed["crs"]["properties"]["name"], "EPSG:32750");
}

#[test]
fn test_output_keeps_columns_for_years_without_contours() {
    init_logs();
    // Window runs to 2023 but observations stop in 2021, so 2023 sits
    // beyond even the gapfill reach and traces no contour at all
    let pipeline = TilePipeline::new(AnalysisParams {
        start_year: 2020,
        end_year: 2023,
        baseline_year: 2020,
        min_contour_vertices: 5,
        ..AnalysisParams::default()
    });
    let merged = pipeline
        .run_and_merge(
            vec![two_year_tile()],
            TileMergeParams {
                target_crs: Crs::Utm { zone: 50, northern: false },
                output_version: "2.0.0".to_string(),
                overlap_buffer: 1.0,
            },
        )
        .expect("merge");

    let collection = VectorWriter::points_collection(&merged);
    let props = collection["features"][0]["properties"]
        .as_object()
        .expect("properties object");
    for year in 2020..=2023 {
        assert!(
            props.contains_key(&format!("dist_{}", year)),
            "missing dist_{} column",
            year
        );
    }
    assert!(props["dist_2023"].is_null(), "untraced year must be null");
    assert!((props["dist_2021"].as_f64().expect("dist") - 30.0).abs() < 1e-6);
}
