//! Full calibration run over a loaded road graph.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::capacity::resolve_capacities;
use crate::config::CalibrationConfig;
use crate::corrections::CorrectionTable;
use crate::counts::AggregatedCounts;
use crate::network::RoadGraph;
use crate::scale::{scale_free_flow_speed, scale_lane_capacities};

/// One row of the run log.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub timestamp: DateTime<Utc>,
    pub count_keys: usize,
    pub links_resolved: usize,
    pub links_implausible: usize,
    pub links_unmatched: usize,
    pub lanes_resolved: usize,
    pub lanes_implausible: usize,
    pub lanes_unmatched: usize,
    pub links_doubled: usize,
    pub links_overridden: usize,
    pub lanes_scaled: usize,
    pub links_speed_scaled: usize,
}

/// Resolves capacities, applies the correction table, then scales.
///
/// The correction table is validated against the unmodified graph first, so
/// a bad table aborts the run before anything is written to the graph.
#[tracing::instrument(skip_all, fields(count_keys = counts.len()))]
pub fn calibrate(
    graph: &mut RoadGraph,
    counts: &AggregatedCounts,
    corrections: &CorrectionTable,
    config: &CalibrationConfig,
) -> Result<CalibrationSummary> {
    config.validate()?;
    corrections.validate(&graph.network)?;

    let capacities = resolve_capacities(graph, counts, config);
    let corrected = corrections.apply(&mut graph.network)?;

    let lanes_scaled = scale_lane_capacities(&mut graph.lanes, config.capacity_factor);
    let links_speed_scaled = scale_free_flow_speed(&mut graph.network, config.free_flow_factor);

    let summary = CalibrationSummary {
        timestamp: Utc::now(),
        count_keys: counts.len(),
        links_resolved: capacities.links.resolved.len(),
        links_implausible: capacities.links.implausible,
        links_unmatched: capacities.links.unmatched,
        lanes_resolved: capacities.lanes.resolved.len(),
        lanes_implausible: capacities.lanes.implausible,
        lanes_unmatched: capacities.lanes.unmatched,
        links_doubled: corrected.doubled,
        links_overridden: corrected.overridden,
        lanes_scaled,
        links_speed_scaled,
    };

    info!(
        links_resolved = summary.links_resolved,
        lanes_resolved = summary.lanes_resolved,
        "Calibration finished"
    );
    Ok(summary)
}
