//! Tide-model archive round trip: build a real zip archive in a temp
//! directory, unpack it and evaluate heights from the parsed grids.

use chrono::{TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use shoreline::io::TideModelReader;
use std::io::Write;
use zip::write::FileOptions;
use zip::ZipWriter;

/// 2x3 constant grid over lon 110-113, lat -42..-40
fn ascii_grid(value: f32) -> String {
    format!(
        "ncols 3\nnrows 2\nxllcorner 110.0\nyllcorner -42.0\ncellsize 1.0\nNODATA_value -9999\n\
         {v} {v} {v}\n{v} {v} {v}\n",
        v = value
    )
}

fn build_archive(path: &std::path::Path) {
    let file = std::fs::File::create(path).expect("create archive");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    // Plain members
    for (name, value) in [
        ("aus/m2_amplitude.asc", 1.5f32),
        ("aus/m2_phase.asc", 0.0),
        ("aus/s2_amplitude.asc", 0.5),
    ] {
        zip.start_file(name, options).expect("start member");
        zip.write_all(ascii_grid(value).as_bytes()).expect("write member");
    }

    // One gzipped member, as shipped archives sometimes have
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(ascii_grid(0.0).as_bytes()).expect("gzip");
    let compressed = gz.finish().expect("gzip finish");
    zip.start_file("aus/s2_phase.asc.gz", options).expect("start member");
    zip.write_all(&compressed).expect("write member");

    zip.finish().expect("finish archive");
}

#[test]
fn test_unpack_and_read_region() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_path = dir.path().join("tide_model.zip");
    build_archive(&archive_path);

    let unpack_dir = dir.path().join("unpacked");
    let extracted =
        TideModelReader::unpack_archive(&archive_path, &unpack_dir).expect("unpack");
    assert_eq!(extracted.len(), 4);
    // The gzipped member lost its .gz suffix on extraction
    assert!(unpack_dir.join("aus/s2_phase.asc").exists());

    let grid = TideModelReader::read_region(&unpack_dir, "aus").expect("read region");
    assert_eq!(grid.region, "aus");
    assert_eq!(grid.shape(), (2, 3));
    assert_eq!(grid.m2_amplitude[[0, 0]], 1.5);
    assert_eq!(grid.s2_amplitude[[1, 2]], 0.5);
    assert_eq!(grid.s2_phase[[0, 0]], 0.0);
}

#[test]
fn test_heights_from_unpacked_grids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_path = dir.path().join("tide_model.zip");
    build_archive(&archive_path);

    let unpack_dir = dir.path().join("unpacked");
    TideModelReader::unpack_archive(&archive_path, &unpack_dir).expect("unpack");
    let grid = TideModelReader::read_region(&unpack_dir, "aus").expect("read region");

    // Constituent amplitudes 1.5 + 0.5 bound the height
    let t = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
    let h = grid.height_at(t, 111.5, -41.0).expect("inside grid");
    assert!(h.abs() <= 2.0 + 1e-6, "height {} exceeds amplitude sum", h);

    // Outside the grid footprint
    assert!(grid.height_at(t, 150.0, -41.0).is_none());
}

#[test]
fn test_fetch_unpacks_and_reads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_path = dir.path().join("tide_model.zip");
    build_archive(&archive_path);

    let grid = TideModelReader::fetch(&archive_path, dir.path().join("unpacked"), "aus", 2)
        .expect("fetch");
    assert_eq!(grid.shape(), (2, 3));
}

#[test]
fn test_missing_region_is_data_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_path = dir.path().join("tide_model.zip");
    build_archive(&archive_path);

    let unpack_dir = dir.path().join("unpacked");
    TideModelReader::unpack_archive(&archive_path, &unpack_dir).expect("unpack");
    assert!(TideModelReader::read_region(&unpack_dir, "nowhere").is_err());
}
