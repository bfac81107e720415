//! Turning-movement count ingestion.
//!
//! Reads the per-interval counts CSV (`fromEdgeId,toEdgeId,fromLaneId,intervalVehicleSum`)
//! and sums rows sharing the same `(from link, to link, from lane)` key.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::hash_map;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::network::{LaneId, LinkId, open_input};

#[derive(Debug, Error)]
pub enum CountsError {
    #[error("failed to read count file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed count record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },
    #[error("count for {from_link} -> {to_link} on lane {from_lane} overflows at line {line}")]
    CountOverflow {
        line: u64,
        from_link: LinkId,
        to_link: LinkId,
        from_lane: LaneId,
    },
}

/// Row as it appears in the file, before validation.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "fromEdgeId")]
    from_edge_id: String,
    #[serde(rename = "toEdgeId")]
    to_edge_id: String,
    #[serde(rename = "fromLaneId")]
    from_lane_id: String,
    #[serde(rename = "intervalVehicleSum")]
    interval_vehicle_sum: String,
}

/// One interval's vehicle count for one turning movement on one lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRecord {
    pub from_link: LinkId,
    pub to_link: LinkId,
    pub from_lane: LaneId,
    pub count: u64,
}

impl CapacityRecord {
    pub fn new(from_link: &str, to_link: &str, from_lane: &str, count: u64) -> Self {
        Self {
            from_link: LinkId::new(from_link),
            to_link: LinkId::new(to_link),
            from_lane: LaneId::new(from_lane),
            count,
        }
    }

    fn key(&self) -> TurnKey {
        TurnKey {
            from_link: self.from_link.clone(),
            to_link: self.to_link.clone(),
            from_lane: self.from_lane.clone(),
        }
    }
}

impl TryFrom<RawRecord> for CapacityRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let required = [
            ("fromEdgeId", &raw.from_edge_id),
            ("toEdgeId", &raw.to_edge_id),
            ("fromLaneId", &raw.from_lane_id),
            ("intervalVehicleSum", &raw.interval_vehicle_sum),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.is_empty()) {
            return Err(format!("empty value in column {name}"));
        }

        let count = raw.interval_vehicle_sum.parse::<u64>().map_err(|e| {
            format!(
                "intervalVehicleSum {:?} is not a non-negative integer: {e}",
                raw.interval_vehicle_sum
            )
        })?;

        Ok(Self {
            from_link: LinkId(raw.from_edge_id),
            to_link: LinkId(raw.to_edge_id),
            from_lane: LaneId(raw.from_lane_id),
            count,
        })
    }
}

/// Composite key of a turning movement through one lane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnKey {
    pub from_link: LinkId,
    pub to_link: LinkId,
    pub from_lane: LaneId,
}

/// Summed counts per [`TurnKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedCounts {
    counts: HashMap<TurnKey, u64>,
}

impl AggregatedCounts {
    /// Adds `record` to its key and returns the new total.
    ///
    /// Returns `None` and leaves the total unchanged if the sum would overflow.
    pub fn add(&mut self, record: &CapacityRecord) -> Option<u64> {
        let total = self.counts.entry(record.key()).or_insert(0);
        *total = total.checked_add(record.count)?;
        Some(*total)
    }

    fn add_saturating(&mut self, record: &CapacityRecord) {
        let total = self.counts.entry(record.key()).or_insert(0);
        *total = total.saturating_add(record.count);
    }

    pub fn get(&self, from_link: &str, to_link: &str, from_lane: &str) -> Option<u64> {
        self.counts
            .get(&TurnKey {
                from_link: LinkId::new(from_link),
                to_link: LinkId::new(to_link),
                from_lane: LaneId::new(from_lane),
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, TurnKey, u64> {
        self.counts.iter()
    }
}

/// Collected sums saturate at `u64::MAX`. Count files go through
/// [`aggregate_records`], which rejects overflow instead.
impl<'a> FromIterator<&'a CapacityRecord> for AggregatedCounts {
    fn from_iter<I: IntoIterator<Item = &'a CapacityRecord>>(iter: I) -> Self {
        let mut counts = Self::default();
        for record in iter {
            counts.add_saturating(record);
        }
        counts
    }
}

impl FromIterator<CapacityRecord> for AggregatedCounts {
    fn from_iter<I: IntoIterator<Item = CapacityRecord>>(iter: I) -> Self {
        let mut counts = Self::default();
        for record in iter {
            counts.add_saturating(&record);
        }
        counts
    }
}

fn malformed(err: csv::Error) -> CountsError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(e) => CountsError::Io(e),
        kind => CountsError::MalformedRecord {
            line,
            reason: format!("{kind:?}"),
        },
    }
}

/// Parses and sums all records from `reader`.
///
/// # Errors
///
/// The first row with a missing column or a count that is not a non-negative
/// integer aborts the whole read with [`CountsError::MalformedRecord`]. A row
/// whose count pushes its key's total past `u64::MAX` aborts with
/// [`CountsError::CountOverflow`]. No partial aggregate is ever returned.
pub fn aggregate_records<R: Read>(reader: R) -> Result<AggregatedCounts, CountsError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(malformed)?.clone();
    let mut counts = AggregatedCounts::default();
    let mut rows = 0usize;
    let mut record = StringRecord::new();

    while rdr.read_record(&mut record).map_err(malformed)? {
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let raw: RawRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| CountsError::MalformedRecord {
                line,
                reason: e.to_string(),
            })?;

        let parsed = CapacityRecord::try_from(raw)
            .map_err(|reason| CountsError::MalformedRecord { line, reason })?;

        if counts.add(&parsed).is_none() {
            return Err(CountsError::CountOverflow {
                line,
                from_link: parsed.from_link,
                to_link: parsed.to_link,
                from_lane: parsed.from_lane,
            });
        }
        rows += 1;
    }

    debug!(rows, keys = counts.len(), "Count records aggregated");
    Ok(counts)
}

/// Reads lane capacities from a counts CSV, optionally gzip-compressed.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn read_lane_capacities(path: &Path) -> Result<AggregatedCounts, CountsError> {
    let counts = aggregate_records(open_input(path)?)?;
    info!(keys = counts.len(), "Read lane capacities");
    Ok(counts)
}
