//! Turn-efficiency attribute storage.
//!
//! A resolved link or lane carries, under [`ATTR_TURN_EFFICIENCY`], a map from
//! destination link id to the share of its capacity that the turning movement
//! uses. Both sides are stored as strings so the attribute survives any
//! serialization format. Ratios are not normalized and may sum to more than one.

use std::collections::BTreeMap;

use crate::network::{AttributeValue, Attributes, LinkId};

pub const ATTR_TURN_EFFICIENCY: &str = "turnEfficiency";

/// Returns the element's own turn-efficiency map, creating it on first access.
///
/// A value of any other type stored under the reserved key is replaced by an
/// empty map.
pub fn turn_efficiency_map_mut(attributes: &mut Attributes) -> &mut BTreeMap<String, String> {
    if !matches!(
        attributes.get(ATTR_TURN_EFFICIENCY),
        Some(AttributeValue::Map(_))
    ) {
        attributes.insert(ATTR_TURN_EFFICIENCY, AttributeValue::Map(BTreeMap::new()));
    }

    match attributes.get_mut(ATTR_TURN_EFFICIENCY) {
        Some(AttributeValue::Map(map)) => map,
        _ => unreachable!("turn efficiency map was just inserted"),
    }
}

pub fn set_turn_efficiency(attributes: &mut Attributes, to_link: &LinkId, ratio: f64) {
    turn_efficiency_map_mut(attributes).insert(to_link.to_string(), ratio.to_string());
}

/// Looks up the efficiency factor for turning into `to_link`.
///
/// Returns `None` when no map is present, the destination is not listed, or
/// the stored value does not parse as a number.
pub fn turn_efficiency(attributes: &Attributes, to_link: &LinkId) -> Option<f64> {
    match attributes.get(ATTR_TURN_EFFICIENCY) {
        Some(AttributeValue::Map(map)) => map.get(&to_link.0)?.parse().ok(),
        _ => None,
    }
}

/// All stored efficiencies of an element, parsed.
pub fn turn_efficiencies(attributes: &Attributes) -> BTreeMap<LinkId, f64> {
    match attributes.get(ATTR_TURN_EFFICIENCY) {
        Some(AttributeValue::Map(map)) => map
            .iter()
            .filter_map(|(to, ratio)| Some((LinkId::new(to.as_str()), ratio.parse().ok()?)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
