//! Connection cost model - computed on the fly, never stored
//!
//! Cost of a connection = cost of entering and traversing its target segment:
//! - A: distance in metres of the target segment
//! - B: travel time in deciseconds, including the turn penalty
//! - C: standard time (reserved, mirrors B)
//! - D: reserved, always 0
//!
//! The source segment only shapes the penalty (road class changes, ramps).
//! When it cannot be resolved, for example because it lives on another map,
//! the target segment stands in for it and the estimate is marked
//! [`Confidence::Approximated`].

use serde::{Deserialize, Serialize};

use super::{Connection, EntryRestriction, Node, TurnDirection};
use crate::item::{Item, ItemType, RouteableItem};

/// Four cost components of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionCost {
    pub cost_a: u32,
    pub cost_b: u32,
    pub cost_c: u32,
    pub cost_d: u32,
}

/// Whether the source segment's own properties were used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Exact,
    /// Source segment unknown locally; the target segment stood in for it
    Approximated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    pub cost: ConnectionCost,
    pub confidence: Confidence,
}

/// Speeds and penalties of the cost function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Default speed per road class (index 0 = top class), km/h
    pub class_speed_kmh: [u32; 5],
    /// Ferries and bus routes without a speed limit
    pub default_speed_kmh: u32,
    /// Penalty per road class step between source and target, deciseconds
    pub class_change_penalty_ds: u32,
    /// Entering or leaving a controlled-access road, deciseconds
    pub ramp_penalty_ds: u32,
    /// Entering a no-throughfare node, deciseconds
    pub no_throughfare_penalty_ds: u32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            class_speed_kmh: [110, 90, 70, 50, 30],
            default_speed_kmh: 20,
            class_change_penalty_ds: 10,
            ramp_penalty_ds: 50,
            no_throughfare_penalty_ds: 600,
        }
    }
}

impl CostModel {
    /// Turn penalty in deciseconds (right-hand traffic: left turns cost more)
    pub fn turn_penalty_ds(turn: TurnDirection) -> u32 {
        match turn {
            TurnDirection::FollowRoad | TurnDirection::Ahead => 0,
            TurnDirection::KeepLeft | TurnDirection::KeepRight => 10,
            TurnDirection::Right => 40,
            TurnDirection::Left => 75,
            TurnDirection::UTurn => 275,
            TurnDirection::EnterRoundabout => 50,
            TurnDirection::AheadRoundabout => 0,
            TurnDirection::ExitRoundabout => 20,
            TurnDirection::OnRamp | TurnDirection::OffRamp => 20,
            TurnDirection::EnterFerry | TurnDirection::ExitFerry | TurnDirection::ChangeFerry => 600,
            TurnDirection::Undefined => 0,
        }
    }

    pub fn speed_kmh(&self, item: &Item, road: &RouteableItem) -> u32 {
        if road.speed_limit_kmh > 0 {
            return road.speed_limit_kmh as u32;
        }
        if item.item_type() != ItemType::StreetSegment {
            return self.default_speed_kmh;
        }
        let class = (road.road_class as usize).min(self.class_speed_kmh.len() - 1);
        self.class_speed_kmh[class]
    }

    /// Travel time over `length_m` at the segment speed, deciseconds
    pub fn traversal_ds(&self, item: &Item, road: &RouteableItem, length_m: f64) -> u32 {
        let speed_ms = self.speed_kmh(item, road).max(1) as f64 / 3.6;
        (length_m / speed_ms * 10.0).round() as u32
    }

    pub fn estimate(
        &self,
        connection: &Connection,
        to_node: &Node,
        to: (&Item, &RouteableItem),
        from: Option<(&Item, &RouteableItem)>,
    ) -> CostEstimate {
        let (to_item, to_road) = to;
        let (confidence, (_, from_road)) = match from {
            Some(from) => (Confidence::Exact, from),
            None => (Confidence::Approximated, to),
        };

        let length_m = to_item.length_m();
        let mut time = self.traversal_ds(to_item, to_road, length_m);
        time = time.saturating_add(Self::turn_penalty_ds(connection.turn));

        let class_steps = (from_road.road_class as i32 - to_road.road_class as i32).unsigned_abs();
        time = time.saturating_add(class_steps * self.class_change_penalty_ds);
        if from_road.is_controlled_access() != to_road.is_controlled_access() {
            time = time.saturating_add(self.ramp_penalty_ds);
        }
        if to_node.entry_restriction == EntryRestriction::NoThroughfare {
            time = time.saturating_add(self.no_throughfare_penalty_ds);
        }

        CostEstimate {
            cost: ConnectionCost {
                cost_a: length_m.round() as u32,
                cost_b: time,
                cost_c: time,
                cost_d: 0,
            },
            confidence,
        }
    }
}
