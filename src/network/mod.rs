//! In-memory road graph: links, the lanes assigned to them, and the
//! attribute bags both carry.
//!
//! Every element owns its [`Attributes`] by value. There is no shared
//! default instance, so writing to one element's bag can never show up on
//! another element.

mod io;

pub use io::{open_input, read_graph, write_graph};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Marks a link whose capacity was derived from count data.
pub const ATTR_JUNCTION: &str = "junction";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single value in an element's attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, String>),
}

/// Generic string-keyed attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut AttributeValue> {
        self.0.get_mut(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: AttributeValue,
    ) -> Option<AttributeValue> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.remove(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(AttributeValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Directed road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub length: f64,
    /// Free flow speed in m/s.
    pub freespeed: f64,
    /// Flow capacity in vehicles per hour.
    pub capacity: f64,
    pub number_of_lanes: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Link {
    pub fn new(id: LinkId, capacity: f64, number_of_lanes: f64) -> Self {
        Self {
            id,
            length: 0.0,
            freespeed: 0.0,
            capacity,
            number_of_lanes,
            attributes: Attributes::default(),
        }
    }

    /// True once the capacity has been replaced by an empirical value.
    pub fn is_junction(&self) -> bool {
        self.attributes.get_bool(ATTR_JUNCTION).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub capacity_vehicles_per_hour: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Lane {
    pub fn new(id: LaneId, capacity_vehicles_per_hour: f64) -> Self {
        Self {
            id,
            capacity_vehicles_per_hour,
            attributes: Attributes::default(),
        }
    }
}

/// Lanes owned by one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanesToLinkAssignment {
    pub link_id: LinkId,
    pub lanes: BTreeMap<LaneId, Lane>,
}

impl LanesToLinkAssignment {
    pub fn new(link_id: LinkId) -> Self {
        Self {
            link_id,
            lanes: BTreeMap::new(),
        }
    }

    pub fn add_lane(&mut self, lane: Lane) {
        self.lanes.insert(lane.id.clone(), lane);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lanes {
    pub assignments: BTreeMap<LinkId, LanesToLinkAssignment>,
}

impl Lanes {
    pub fn add_assignment(&mut self, assignment: LanesToLinkAssignment) {
        let link_id = assignment.link_id.clone();
        self.assignments.insert(link_id, assignment);
    }

    pub fn lane(&self, link: &LinkId, lane: &LaneId) -> Option<&Lane> {
        self.assignments.get(link)?.lanes.get(lane)
    }

    pub fn lane_mut(&mut self, link: &LinkId, lane: &LaneId) -> Option<&mut Lane> {
        self.assignments.get_mut(link)?.lanes.get_mut(lane)
    }

    pub fn iter_lanes_mut(&mut self) -> impl Iterator<Item = &mut Lane> {
        self.assignments
            .values_mut()
            .flat_map(|l2l| l2l.lanes.values_mut())
    }

    pub fn lane_count(&self) -> usize {
        self.assignments.values().map(|l2l| l2l.lanes.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub links: BTreeMap<LinkId, Link>,
}

impl Network {
    pub fn add_link(&mut self, link: Link) {
        self.links.insert(link.id.clone(), link);
    }

    pub fn link(&self, id: &LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn link_mut(&mut self, id: &LinkId) -> Option<&mut Link> {
        self.links.get_mut(id)
    }

    pub fn contains(&self, id: &LinkId) -> bool {
        self.links.contains_key(id)
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to read or write network file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid network document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lane assignment for link {assignment} is stored under key {key}")]
    KeyMismatch { key: LinkId, assignment: LinkId },
    #[error("lanes assigned to links missing from the network: {0:?}")]
    DanglingLanes(Vec<LinkId>),
    #[error("links with a lane count that is not a positive number: {0:?}")]
    InvalidLaneCount(Vec<LinkId>),
}

/// The persistent artifact of a run: the link network plus its lane
/// definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadGraph {
    pub network: Network,
    #[serde(default)]
    pub lanes: Lanes,
}

impl RoadGraph {
    /// Every lane assignment must belong to a link of the network, otherwise
    /// the graph is broken and nothing downstream can be trusted. Every link
    /// needs a finite, positive lane count for the per-lane capacity gate.
    pub fn check_consistency(&self) -> Result<(), NetworkError> {
        let bad_lanes: Vec<LinkId> = self
            .network
            .links
            .values()
            .filter(|link| !(link.number_of_lanes.is_finite() && link.number_of_lanes > 0.0))
            .map(|link| link.id.clone())
            .collect();
        if !bad_lanes.is_empty() {
            return Err(NetworkError::InvalidLaneCount(bad_lanes));
        }

        if let Some((key, l2l)) = self
            .lanes
            .assignments
            .iter()
            .find(|(key, l2l)| **key != l2l.link_id)
        {
            return Err(NetworkError::KeyMismatch {
                key: key.clone(),
                assignment: l2l.link_id.clone(),
            });
        }

        let dangling: Vec<LinkId> = self
            .lanes
            .assignments
            .keys()
            .filter(|id| !self.network.contains(id))
            .cloned()
            .collect();

        if dangling.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::DanglingLanes(dangling))
        }
    }
}
