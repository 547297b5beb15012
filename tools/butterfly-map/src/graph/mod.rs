//! Routing graph: nodes and connections of routeable items
//!
//! Nodes live inside their routeable item (arena storage in the item store);
//! connections name their source node by id, never by reference. The graph is
//! therefore a read-only view over an [`ItemStore`].
//!
//! A connection stored in node `Y`'s list with `from == X` means: after
//! traversing `X`'s item in `X`'s direction, a vehicle may continue by entering
//! `Y`.

pub mod cost;
pub mod expansion;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::{Item, ItemId, ItemStore, RouteableItem};

pub use cost::{Confidence, ConnectionCost, CostEstimate, CostModel};
pub use expansion::NodeExpansionTable;

/// Directed endpoint of a routeable item: the item id plus a node1 flag in bit 31
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const NODE1_BIT: u32 = 0x8000_0000;

    pub fn from_item(item: ItemId, node1: bool) -> Self {
        NodeId(item.raw() | if node1 { Self::NODE1_BIT } else { 0 })
    }

    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn item(self) -> ItemId {
        ItemId::from_masked(self.0)
    }

    pub fn is_node1(self) -> bool {
        self.0 & Self::NODE1_BIT != 0
    }

    /// The other direction of the same item
    pub fn opposite(self) -> Self {
        NodeId(self.0 ^ Self::NODE1_BIT)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?}/{})", self.item(), self.is_node1() as u8)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Restriction for entering a node
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryRestriction {
    #[default]
    NoRestrictions = 0,
    NoThroughfare = 1,
    NoEntry = 2,
    NoWay = 3,
}

impl EntryRestriction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EntryRestriction::NoRestrictions),
            1 => Some(EntryRestriction::NoThroughfare),
            2 => Some(EntryRestriction::NoEntry),
            3 => Some(EntryRestriction::NoWay),
            _ => None,
        }
    }
}

/// Turn classification of a connection
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TurnDirection {
    #[default]
    Undefined = 0,
    FollowRoad = 1,
    Ahead = 2,
    KeepLeft = 3,
    KeepRight = 4,
    Left = 5,
    Right = 6,
    UTurn = 7,
    EnterRoundabout = 8,
    ExitRoundabout = 9,
    AheadRoundabout = 10,
    OnRamp = 11,
    OffRamp = 12,
    EnterFerry = 13,
    ExitFerry = 14,
    ChangeFerry = 15,
}

impl TurnDirection {
    pub fn from_u8(v: u8) -> Option<Self> {
        use TurnDirection::*;
        const ALL: [TurnDirection; 16] = [
            Undefined,
            FollowRoad,
            Ahead,
            KeepLeft,
            KeepRight,
            Left,
            Right,
            UTurn,
            EnterRoundabout,
            ExitRoundabout,
            AheadRoundabout,
            OnRamp,
            OffRamp,
            EnterFerry,
            ExitFerry,
            ChangeFerry,
        ];
        ALL.get(v as usize).copied()
    }

    pub fn is_roundabout(self) -> bool {
        matches!(
            self,
            TurnDirection::EnterRoundabout
                | TurnDirection::ExitRoundabout
                | TurnDirection::AheadRoundabout
        )
    }
}

/// Vehicle-class bits of a connection's restriction mask. A set bit means
/// the vehicle class may use the connection.
pub mod vehicle {
    pub const PASSENGER_CAR: u32 = 1 << 0;
    pub const PEDESTRIAN: u32 = 1 << 1;
    pub const BICYCLE: u32 = 1 << 2;
    pub const MOTORCYCLE: u32 = 1 << 3;
    pub const BUS: u32 = 1 << 4;
    pub const TAXI: u32 = 1 << 5;
    pub const TRUCK: u32 = 1 << 6;
    pub const EMERGENCY: u32 = 1 << 7;
    pub const ALL_VEHICLES: u32 = 0x0000_ffff;

    /// Derived at query time, never stored: entering a toll road from a non-toll road
    pub const AVOID_TOLL_ROAD: u32 = 1 << 24;
    /// Derived at query time, never stored: leaving a controlled-access or top-class road
    pub const AVOID_HIGHWAY: u32 = 1 << 25;
}

/// Directed edge into the node whose list holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub turn: TurnDirection,
    pub vehicle_restrictions: u32,
}

impl Connection {
    pub fn new(from: NodeId, turn: TurnDirection) -> Self {
        Self {
            from,
            turn,
            vehicle_restrictions: vehicle::ALL_VEHICLES,
        }
    }

    pub fn allows(&self, vehicle_bits: u32) -> bool {
        self.vehicle_restrictions & vehicle_bits == vehicle_bits
    }
}

/// One directed endpoint of a routeable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub entry_restriction: EntryRestriction,
    /// Incoming connections, in stored order
    pub connections: Vec<Connection>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            entry_restriction: EntryRestriction::NoRestrictions,
            connections: Vec::new(),
        }
    }
}

/// Read-only view of the node/connection graph of one map
#[derive(Clone, Copy)]
pub struct Graph<'a> {
    items: &'a ItemStore,
}

impl<'a> Graph<'a> {
    pub fn new(items: &'a ItemStore) -> Self {
        Self { items }
    }

    pub fn routeable(&self, item: ItemId) -> Option<(&'a Item, &'a RouteableItem)> {
        let item = self.items.item_lookup(item)?;
        item.as_routeable().map(|r| (item, r))
    }

    pub fn node_lookup(&self, node: NodeId) -> Option<&'a Node> {
        self.routeable(node.item())
            .map(|(_, r)| r.node(node.is_node1()))
    }

    /// Every node of every routeable item, zoom by zoom
    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + 'a {
        self.items
            .iter()
            .filter_map(|item| item.as_routeable())
            .flat_map(|r| r.nodes.iter())
    }

    /// Every `(to_node, connection)` pair, in node enumeration order
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, &'a Connection)> + 'a {
        self.nodes()
            .flat_map(|node| node.connections.iter().map(move |c| (node.id, c)))
    }

    pub fn connection_count(&self) -> usize {
        self.nodes().map(|n| n.connections.len()).sum()
    }

    /// Cost of entering `to_node` through `connection`.
    ///
    /// For external connections the source segment lives on another map and
    /// the estimate uses the target segment's properties in its place. An
    /// unresolvable local source degrades the same way.
    pub fn connection_cost(
        &self,
        model: &CostModel,
        connection: &Connection,
        to_node: NodeId,
        external: bool,
    ) -> Option<CostEstimate> {
        let (to_item, to_road) = self.routeable(to_node.item())?;
        let from = if external {
            None
        } else {
            self.routeable(connection.from.item())
        };
        Some(model.estimate(
            connection,
            to_road.node(to_node.is_node1()),
            (to_item, to_road),
            from,
        ))
    }

    /// Stored restriction bits plus the derived toll and highway bits
    pub fn vehicle_restrictions(&self, connection: &Connection, to_node: NodeId) -> u32 {
        let mut mask = connection.vehicle_restrictions;
        let Some((_, from)) = self.routeable(connection.from.item()) else {
            return mask;
        };
        if from.is_controlled_access() || from.road_class == 0 {
            mask |= vehicle::AVOID_HIGHWAY;
        }
        if let Some((_, to)) = self.routeable(to_node.item()) {
            if to.is_toll() && !from.is_toll() {
                mask |= vehicle::AVOID_TOLL_ROAD;
            }
        }
        mask
    }
}
