//! Manual corrections for network elements the import gets wrong.
//!
//! The most common errors are a wrong number of lanes or an implausible
//! capacity. The table is plain data, stored on disk as JSON:
//!
//! ```json
//! {
//!   "double_lanes": ["25494723", "-367884913"],
//!   "capacity_overrides": [{ "link": "239242545", "capacity": 3000.0 }]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::network::{LinkId, Network};

#[derive(Debug, Error, PartialEq)]
pub enum CorrectionError {
    #[error(
        "correction table references {} link(s) missing from the network: {}",
        .0.len(),
        join_ids(.0)
    )]
    MissingLinks(Vec<LinkId>),
}

fn join_ids(ids: &[LinkId]) -> String {
    ids.iter()
        .map(|id| id.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityOverride {
    pub link: LinkId,
    pub capacity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionTable {
    /// Links whose lane count and capacity are doubled.
    pub double_lanes: Vec<LinkId>,
    /// Absolute capacities, applied in order after the doubling.
    pub capacity_overrides: Vec<CapacityOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionReport {
    pub doubled: usize,
    pub overridden: usize,
}

impl CorrectionTable {
    /// Loads the table from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read correction table {}", path.display()))?;
        let table: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid correction table {}", path.display()))?;
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.double_lanes.is_empty() && self.capacity_overrides.is_empty()
    }

    /// Checks every referenced id up front.
    ///
    /// # Errors
    ///
    /// Returns all ids missing from `network`, sorted and deduplicated, in a
    /// single [`CorrectionError::MissingLinks`].
    pub fn validate(&self, network: &Network) -> Result<(), CorrectionError> {
        let missing: BTreeSet<&LinkId> = self
            .double_lanes
            .iter()
            .chain(self.capacity_overrides.iter().map(|o| &o.link))
            .filter(|id| !network.contains(id))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CorrectionError::MissingLinks(
                missing.into_iter().cloned().collect(),
            ))
        }
    }

    /// Applies the table to `network`.
    ///
    /// Nothing is modified unless every id validates. A link listed twice for
    /// doubling is doubled once; for repeated overrides the last value wins.
    #[tracing::instrument(
        skip_all,
        fields(
            double_lanes = self.double_lanes.len(),
            overrides = self.capacity_overrides.len()
        )
    )]
    pub fn apply(&self, network: &mut Network) -> Result<CorrectionReport, CorrectionError> {
        self.validate(network)?;

        let mut report = CorrectionReport::default();

        // dedup in case an id is accidentally repeated
        let doubled: BTreeSet<&LinkId> = self.double_lanes.iter().collect();

        for id in doubled {
            if let Some(link) = network.link_mut(id) {
                link.number_of_lanes *= 2.0;
                link.capacity *= 2.0;
                report.doubled += 1;
                debug!(
                    link = %id,
                    lanes = link.number_of_lanes,
                    capacity = link.capacity,
                    "Doubled lanes"
                );
            }
        }

        for o in &self.capacity_overrides {
            if let Some(link) = network.link_mut(&o.link) {
                link.capacity = o.capacity;
                report.overridden += 1;
                debug!(link = %o.link, capacity = o.capacity, "Capacity overridden");
            }
        }

        info!(
            doubled = report.doubled,
            overridden = report.overridden,
            "Network corrections applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Link;
    use std::env;
    use std::fs;

    fn network(ids: &[&str]) -> Network {
        let mut network = Network::default();
        for id in ids {
            network.add_link(Link::new(LinkId::new(*id), 1000.0, 1.0));
        }
        network
    }

    fn table(double: &[&str], overrides: &[(&str, f64)]) -> CorrectionTable {
        CorrectionTable {
            double_lanes: double.iter().map(|id| LinkId::new(*id)).collect(),
            capacity_overrides: overrides
                .iter()
                .map(|(id, capacity)| CapacityOverride {
                    link: LinkId::new(*id),
                    capacity: *capacity,
                })
                .collect(),
        }
    }

    #[test]
    fn test_doubling_applied_once_per_link() {
        let mut net = network(&["A", "B"]);
        let report = table(&["A", "A"], &[]).apply(&mut net).unwrap();

        let a = net.link(&LinkId::new("A")).unwrap();
        assert_eq!(a.number_of_lanes, 2.0);
        assert_eq!(a.capacity, 2000.0);
        assert_eq!(net.link(&LinkId::new("B")).unwrap().capacity, 1000.0);
        assert_eq!(report.doubled, 1);
    }

    #[test]
    fn test_override_after_doubling_wins() {
        let mut net = network(&["A"]);
        table(&["A"], &[("A", 1200.0)]).apply(&mut net).unwrap();

        let a = net.link(&LinkId::new("A")).unwrap();
        assert_eq!(a.capacity, 1200.0);
        assert_eq!(a.number_of_lanes, 2.0);
    }

    #[test]
    fn test_repeated_override_keeps_last_value() {
        let mut net = network(&["A"]);
        let overrides = table(&[], &[("A", 4000.0), ("A", 3000.0)]);
        overrides.apply(&mut net).unwrap();
        assert_eq!(net.link(&LinkId::new("A")).unwrap().capacity, 3000.0);
    }

    #[test]
    fn test_missing_ids_reported_together() {
        let t = table(&["A", "ghost2", "ghost1"], &[("ghost1", 1.0), ("ghost3", 2.0)]);
        let err = t.validate(&network(&["A"])).unwrap_err();

        assert_eq!(
            err,
            CorrectionError::MissingLinks(vec![
                LinkId::new("ghost1"),
                LinkId::new("ghost2"),
                LinkId::new("ghost3"),
            ])
        );
        assert!(err.to_string().contains("3 link(s)"));
    }

    #[test]
    fn test_failed_validation_mutates_nothing() {
        let mut net = network(&["A"]);
        let before = net.clone();

        let result = table(&["A"], &[("missing", 10.0)]).apply(&mut net);

        assert!(result.is_err());
        assert_eq!(net, before);
    }

    #[test]
    fn test_load_partial_table() {
        let path = env::temp_dir().join("lane_capacity_test_corrections.json");
        fs::write(&path, r#"{ "double_lanes": ["A"] }"#).unwrap();

        let t = CorrectionTable::load(&path).unwrap();
        assert_eq!(t.double_lanes, vec![LinkId::new("A")]);
        assert!(t.capacity_overrides.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_bundled_table_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/corrections.json");
        let t = CorrectionTable::load(&path).unwrap();
        assert!(!t.is_empty());
    }
}
