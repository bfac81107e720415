//! Scenario-wide scaling applied after calibration.

use tracing::info;

use crate::network::{Lanes, Network};

/// Links slower than 25.5 km/h count as slow for free flow scaling.
pub const SLOW_LINK_SPEED: f64 = 25.5 / 3.6;

/// Multiplies every lane capacity by `factor`. Returns the number of lanes touched.
pub fn scale_lane_capacities(lanes: &mut Lanes, factor: f64) -> usize {
    if factor == 1.0 {
        return 0;
    }

    let mut n = 0;
    for lane in lanes.iter_lanes_mut() {
        lane.capacity_vehicles_per_hour *= factor;
        n += 1;
    }

    info!(factor, lanes = n, "Scaled lane capacities");
    n
}

/// Scales up the free flow speed of slow links.
pub fn scale_free_flow_speed(network: &mut Network, factor: f64) -> usize {
    if factor == 1.0 {
        return 0;
    }

    let mut n = 0;
    for link in network.links.values_mut() {
        if link.freespeed < SLOW_LINK_SPEED {
            link.freespeed *= factor;
            n += 1;
        }
    }

    info!(factor, links = n, "Scaled free flow speed");
    n
}
