//! Capacity resolution from aggregated turning counts.
//!
//! Lane capacities are the maximum over all turning directions of a lane,
//! link capacities the sum over their lanes. Turn efficiencies are written in
//! a second pass, once every capacity they are relative to is final.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::config::CalibrationConfig;
use crate::counts::AggregatedCounts;
use crate::efficiency::set_turn_efficiency;
use crate::network::{ATTR_JUNCTION, AttributeValue, LaneId, Lanes, LinkId, Network, RoadGraph};

/// Outcome of [`set_link_capacities`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkResolution {
    /// Links in the count data that are not part of the network.
    pub unmatched: usize,
    /// Links whose capacity was below the plausibility threshold.
    pub implausible: usize,
    pub resolved: BTreeSet<LinkId>,
}

/// Outcome of [`set_lane_capacities`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneResolution {
    /// Lanes in the count data without a matching link assignment or lane.
    pub unmatched: usize,
    pub implausible: usize,
    pub resolved: BTreeSet<(LinkId, LaneId)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapacityReport {
    pub links: LinkResolution,
    pub lanes: LaneResolution,
}

/// Aggregate maximum lane capacities, independent of turning direction.
///
/// A lane serves one movement at a time, so its throughput is bounded by its
/// busiest direction rather than the sum over all of them.
pub fn calc_max_lane_capacities(counts: &AggregatedCounts) -> HashMap<(LinkId, LaneId), u64> {
    let mut lane_capacities: HashMap<(LinkId, LaneId), u64> = HashMap::new();

    for (key, &count) in counts.iter() {
        let entry = lane_capacities
            .entry((key.from_link.clone(), key.from_lane.clone()))
            .or_insert(0);
        *entry = (*entry).max(count);
    }

    lane_capacities
}

/// Sets link capacities from the summed lane capacities, then stores the
/// share of each turning movement relative to the resolved capacity.
///
/// Lane capacities themselves are not modified.
#[tracing::instrument(skip(network, counts))]
pub fn set_link_capacities(
    network: &mut Network,
    counts: &AggregatedCounts,
    threshold: f64,
) -> LinkResolution {
    let lane_capacities = calc_max_lane_capacities(counts);
    let mut link_capacities: HashMap<&LinkId, u64> = HashMap::new();

    for ((link, _), &capacity) in &lane_capacities {
        let sum = link_capacities.entry(link).or_insert(0);
        *sum = sum.saturating_add(capacity);
    }

    let mut resolution = LinkResolution::default();

    for (id, &sum) in &link_capacities {
        let Some(link) = network.link_mut(id) else {
            resolution.unmatched += 1;
            continue;
        };

        // a zero capacity is never plausible, whatever the lane count
        let sum = sum as f64;
        if sum <= 0.0 || sum < threshold * link.number_of_lanes {
            debug!(
                link = %id,
                capacity = sum,
                lanes = link.number_of_lanes,
                "Ignoring implausible link capacity"
            );
            resolution.implausible += 1;
            continue;
        }

        link.capacity = sum;
        link.attributes.insert(ATTR_JUNCTION, AttributeValue::Bool(true));
        resolution.resolved.insert((*id).clone());
    }

    let mut turn_capacities: HashMap<(&LinkId, &LinkId), u64> = HashMap::new();

    for (key, &count) in counts.iter() {
        let sum = turn_capacities
            .entry((&key.from_link, &key.to_link))
            .or_insert(0);
        *sum = sum.saturating_add(count);
    }

    for ((from, to), sum) in turn_capacities {
        if !resolution.resolved.contains(from) {
            continue;
        }
        if let Some(link) = network.link_mut(from) {
            set_turn_efficiency(&mut link.attributes, to, sum as f64 / link.capacity);
        }
    }

    debug!(
        resolved = resolution.resolved.len(),
        implausible = resolution.implausible,
        unmatched = resolution.unmatched,
        "Link capacities set"
    );
    resolution
}

/// Applies the maximum lane capacities to the lane definitions and stores a
/// per-lane turn efficiency for every counted movement of a resolved lane.
#[tracing::instrument(skip(lanes, counts))]
pub fn set_lane_capacities(
    lanes: &mut Lanes,
    counts: &AggregatedCounts,
    threshold: f64,
) -> LaneResolution {
    let lane_capacities = calc_max_lane_capacities(counts);
    let mut resolution = LaneResolution::default();

    for ((link_id, lane_id), capacity) in lane_capacities {
        let Some(l2l) = lanes.assignments.get_mut(&link_id) else {
            resolution.unmatched += 1;
            continue;
        };

        let Some(lane) = l2l.lanes.get_mut(&lane_id) else {
            resolution.unmatched += 1;
            continue;
        };

        let capacity = capacity as f64;
        if capacity <= 0.0 || capacity < threshold {
            debug!(
                link = %link_id,
                lane = %lane_id,
                capacity,
                "Ignoring implausible lane capacity"
            );
            resolution.implausible += 1;
            continue;
        }

        lane.capacity_vehicles_per_hour = capacity;
        resolution.resolved.insert((link_id, lane_id));
    }

    // set turn efficiency depending on to link
    for (key, &count) in counts.iter() {
        let lane_key = (key.from_link.clone(), key.from_lane.clone());
        if !resolution.resolved.contains(&lane_key) {
            continue;
        }
        if let Some(lane) = lanes.lane_mut(&key.from_link, &key.from_lane) {
            let ratio = count as f64 / lane.capacity_vehicles_per_hour;
            set_turn_efficiency(&mut lane.attributes, &key.to_link, ratio);
        }
    }

    debug!(
        resolved = resolution.resolved.len(),
        implausible = resolution.implausible,
        unmatched = resolution.unmatched,
        "Lane capacities set"
    );
    resolution
}

/// Resolves link and lane capacities of `graph` from `counts`.
pub fn resolve_capacities(
    graph: &mut RoadGraph,
    counts: &AggregatedCounts,
    config: &CalibrationConfig,
) -> CapacityReport {
    let links = set_link_capacities(&mut graph.network, counts, config.capacity_threshold);
    let lanes = set_lane_capacities(&mut graph.lanes, counts, config.capacity_threshold);

    info!(
        unmatched_links = links.unmatched,
        unmatched_lanes = lanes.unmatched,
        "Unmatched links: {}, lanes: {}",
        links.unmatched,
        lanes.unmatched
    );

    CapacityReport { links, lanes }
}
