use lane_capacity::config::CalibrationConfig;
use lane_capacity::corrections::CorrectionTable;
use lane_capacity::counts::{CountsError, read_lane_capacities};
use lane_capacity::efficiency::turn_efficiency;
use lane_capacity::network::{LaneId, LinkId, read_graph, write_graph};
use lane_capacity::pipeline::calibrate;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn test_full_pipeline() {
    let mut graph = read_graph(&fixture("network.json")).expect("Failed to read network");
    let counts = read_lane_capacities(&fixture("counts.csv")).expect("Failed to read counts");
    let table = CorrectionTable::load(&fixture("corrections.json")).unwrap();

    let summary = calibrate(&mut graph, &counts, &table, &CalibrationConfig::default()).unwrap();

    assert_eq!(summary.links_resolved, 1);
    assert_eq!(summary.links_implausible, 1);
    assert_eq!(summary.links_unmatched, 1);
    assert_eq!(summary.lanes_resolved, 1);
    assert_eq!(summary.lanes_implausible, 2);
    assert_eq!(summary.lanes_unmatched, 1);

    let a = graph.network.link(&LinkId::new("A")).unwrap();
    assert_eq!(a.capacity, 600.0);
    assert!(a.is_junction());
    assert_eq!(turn_efficiency(&a.attributes, &LinkId::new("B")), Some(1.0));
    let a_to_c = turn_efficiency(&a.attributes, &LinkId::new("C")).unwrap();
    assert!((a_to_c - 1.0 / 6.0).abs() < 1e-12);

    // 250 + 200 is below 2 * 375
    let d = graph.network.link(&LinkId::new("D")).unwrap();
    assert_eq!(d.capacity, 3600.0);
    assert!(!d.is_junction());
    assert_eq!(turn_efficiency(&d.attributes, &LinkId::new("B")), None);

    let a0 = graph.lanes.lane(&LinkId::new("A"), &LaneId::new("A_0")).unwrap();
    assert_eq!(a0.capacity_vehicles_per_hour, 600.0);
    assert_eq!(turn_efficiency(&a0.attributes, &LinkId::new("B")), Some(1.0));

    let b = graph.network.link(&LinkId::new("B")).unwrap();
    assert_eq!(b.capacity, 1800.0);
    assert_eq!(b.number_of_lanes, 2.0);
    assert_eq!(graph.network.link(&LinkId::new("C")).unwrap().capacity, 1200.0);
}

#[test]
fn test_calibrated_graph_survives_gzip_round_trip() {
    let mut graph = read_graph(&fixture("network.json")).unwrap();
    let counts = read_lane_capacities(&fixture("counts.csv")).unwrap();
    calibrate(
        &mut graph,
        &counts,
        &CorrectionTable::default(),
        &CalibrationConfig::default(),
    )
    .unwrap();

    let out = std::env::temp_dir().join("lane_capacity_it_output.json.gz");
    write_graph(&out, &graph).unwrap();
    let reread = read_graph(&out).unwrap();
    std::fs::remove_file(&out).unwrap();

    assert_eq!(reread, graph);
}

#[test]
fn test_rerun_on_calibrated_graph_is_stable() {
    let counts = read_lane_capacities(&fixture("counts.csv")).unwrap();
    let config = CalibrationConfig::default();
    let none = CorrectionTable::default();

    let mut once = read_graph(&fixture("network.json")).unwrap();
    calibrate(&mut once, &counts, &none, &config).unwrap();

    let mut twice = once.clone();
    calibrate(&mut twice, &counts, &none, &config).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_malformed_counts_abort() {
    let err = read_lane_capacities(&fixture("counts_malformed.csv")).unwrap_err();
    assert!(matches!(err, CountsError::MalformedRecord { line: 3, .. }));
}

#[test]
fn test_missing_corrections_reported_before_mutation() {
    let mut graph = read_graph(&fixture("network.json")).unwrap();
    let before = graph.clone();
    let counts = read_lane_capacities(&fixture("counts.csv")).unwrap();

    let bundled_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/corrections.json");
    let bundled = CorrectionTable::load(&bundled_path).unwrap();
    let config = CalibrationConfig::default();
    let err = calibrate(&mut graph, &counts, &bundled, &config).unwrap_err();

    assert!(err.to_string().contains("missing from the network"));
    assert_eq!(graph, before);
}
