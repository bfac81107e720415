//! CSV exports of a calibration run.
//!
//! `write_turn_efficiencies` flattens the stored turn-efficiency maps into one
//! row per movement so they can be checked without reading the graph JSON.
//! `append_summary` keeps a running log of run counters across invocations.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::efficiency::turn_efficiencies;
use crate::network::{LaneId, LinkId, RoadGraph};
use crate::pipeline::CalibrationSummary;

/// One stored turn efficiency. `lane` is empty for link-level ratios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnEfficiencyRow {
    pub link: LinkId,
    pub lane: Option<LaneId>,
    pub to_link: LinkId,
    pub ratio: f64,
    /// Capacity of the link or lane the ratio refers to.
    pub capacity: f64,
}

/// Collects every stored ratio, links in id order, each followed by its lanes.
pub fn turn_efficiency_rows(graph: &RoadGraph) -> Vec<TurnEfficiencyRow> {
    let mut rows = Vec::new();

    for (id, link) in &graph.network.links {
        for (to_link, ratio) in turn_efficiencies(&link.attributes) {
            rows.push(TurnEfficiencyRow {
                link: id.clone(),
                lane: None,
                to_link,
                ratio,
                capacity: link.capacity,
            });
        }

        let Some(l2l) = graph.lanes.assignments.get(id) else {
            continue;
        };
        for lane in l2l.lanes.values() {
            for (to_link, ratio) in turn_efficiencies(&lane.attributes) {
                rows.push(TurnEfficiencyRow {
                    link: id.clone(),
                    lane: Some(lane.id.clone()),
                    to_link,
                    ratio,
                    capacity: lane.capacity_vehicles_per_hour,
                });
            }
        }
    }

    rows
}

/// Writes all turn efficiencies of `graph` to a fresh CSV file.
///
/// Returns the number of rows written.
#[tracing::instrument(skip(path, graph), fields(path = %path.display()))]
pub fn write_turn_efficiencies(path: &Path, graph: &RoadGraph) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    let rows = turn_efficiency_rows(graph);
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), "Turn efficiencies exported");
    Ok(rows.len())
}

/// Appends a [`CalibrationSummary`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_summary(path: &Path, summary: &CalibrationSummary) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending summary row");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(summary)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficiency::set_turn_efficiency;
    use crate::network::{Lane, LanesToLinkAssignment, Link};
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn calibrated_graph() -> RoadGraph {
        let mut graph = RoadGraph::default();

        let mut a = Link::new(LinkId::new("A"), 600.0, 1.0);
        set_turn_efficiency(&mut a.attributes, &LinkId::new("C"), 0.25);
        set_turn_efficiency(&mut a.attributes, &LinkId::new("B"), 1.0);
        graph.network.add_link(a);
        graph.network.add_link(Link::new(LinkId::new("B"), 900.0, 1.0));

        let mut lane = Lane::new(LaneId::new("A_0"), 600.0);
        set_turn_efficiency(&mut lane.attributes, &LinkId::new("B"), 1.0);
        let mut l2l = LanesToLinkAssignment::new(LinkId::new("A"));
        l2l.add_lane(lane);
        graph.lanes.add_assignment(l2l);
        graph
    }

    #[test]
    fn test_rows_cover_links_then_lanes() {
        let rows = turn_efficiency_rows(&calibrated_graph());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].to_link, LinkId::new("B"));
        assert_eq!(rows[0].lane, None);
        assert_eq!(rows[1].to_link, LinkId::new("C"));
        assert_eq!(rows[1].ratio, 0.25);
        assert_eq!(rows[2].lane, Some(LaneId::new("A_0")));
        assert_eq!(rows[2].capacity, 600.0);
    }

    #[test]
    fn test_graph_without_ratios_has_no_rows() {
        let mut graph = RoadGraph::default();
        graph.network.add_link(Link::new(LinkId::new("A"), 600.0, 1.0));
        assert!(turn_efficiency_rows(&graph).is_empty());
    }

    #[test]
    fn test_write_turn_efficiencies_csv() {
        let path = temp_path("lane_capacity_test_turn_efficiencies.csv");
        let _ = fs::remove_file(&path);

        let written = write_turn_efficiencies(&path, &calibrated_graph()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(written, 3);
        assert_eq!(lines[0], "link,lane,to_link,ratio,capacity");
        assert_eq!(lines[1], "A,,B,1.0,600.0");
        assert_eq!(lines[3], "A,A_0,B,1.0,600.0");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_summary_writes_header_once() {
        let path = temp_path("lane_capacity_test_summary_header.csv");
        let _ = fs::remove_file(&path);

        let summary = CalibrationSummary {
            links_resolved: 12,
            ..Default::default()
        };
        append_summary(&path, &summary).unwrap();
        append_summary(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines.iter().filter(|l| l.contains("links_resolved")).count(),
            1
        );

        fs::remove_file(&path).unwrap();
    }
}
