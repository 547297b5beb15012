//! Boundary segments: routeable items entered from neighbouring maps
//!
//! Connections that originate on another map cannot be stored in the target
//! node's own list, since their source node does not exist locally. They are
//! kept here, keyed by the local item id, together with the id of the map
//! they come from.
//!
//! Each node accepts connections from a single foreign map. When a second map
//! tries to connect into the same node, the first map keeps ownership and the
//! new connection is dropped with a warning.

use std::collections::BTreeMap;

use tracing::warn;

use crate::graph::{Connection, NodeId};
use crate::item::ItemId;

/// One connection into this map from another map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalConnection {
    pub from_map: u32,
    /// `connection.from` is a node id on `from_map`
    pub connection: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundarySegment {
    pub item_id: ItemId,
    /// Per node (node0, node1): whether it lies on the map edge
    pub adjacent: [bool; 2],
    /// Per node (node0, node1): connections arriving from other maps
    pub external: [Vec<ExternalConnection>; 2],
}

impl BoundarySegment {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            adjacent: [false; 2],
            external: [Vec::new(), Vec::new()],
        }
    }

    pub fn external_connections(&self, node1: bool) -> &[ExternalConnection] {
        &self.external[node1 as usize]
    }

    pub fn has_external(&self, node1: bool) -> bool {
        !self.external[node1 as usize].is_empty()
    }

    /// The foreign map owning the connections into one node
    pub fn owner_map(&self, node1: bool) -> Option<u32> {
        self.external[node1 as usize].first().map(|c| c.from_map)
    }

    pub fn is_adjacent(&self, node1: bool) -> bool {
        self.adjacent[node1 as usize]
    }
}

/// Boundary segments of one map, sorted by item id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryTable {
    segments: BTreeMap<ItemId, BoundarySegment>,
}

impl BoundaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_boundary_segment(&self, item: ItemId) -> Option<&BoundarySegment> {
        self.segments.get(&item)
    }

    /// Records a connection from `from_map` into local `to_node`.
    ///
    /// Creates the segment when absent and marks the node as adjacent. Returns
    /// false when another map already owns connections into that node; the
    /// connection is then dropped.
    pub fn add_connection(&mut self, from_map: u32, connection: Connection, to_node: NodeId) -> bool {
        let item = to_node.item();
        let segment = self
            .segments
            .entry(item)
            .or_insert_with(|| BoundarySegment::new(item));
        let slot = to_node.is_node1() as usize;

        if let Some(owner) = segment.owner_map(to_node.is_node1()) {
            if owner != from_map {
                warn!(
                    node_id = %to_node,
                    owner_map = owner,
                    from_map,
                    "node already receives connections from another map, dropping connection"
                );
                return false;
            }
        }
        segment.adjacent[slot] = true;
        segment.external[slot].push(ExternalConnection {
            from_map,
            connection,
        });
        true
    }

    /// Flags a node as lying on the map edge without adding a connection
    pub fn mark_adjacent(&mut self, node: NodeId) {
        let item = node.item();
        self.segments
            .entry(item)
            .or_insert_with(|| BoundarySegment::new(item))
            .adjacent[node.is_node1() as usize] = true;
    }

    /// Drops the segment of a removed item
    pub fn remove(&mut self, item: ItemId) -> Option<BoundarySegment> {
        self.segments.remove(&item)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundarySegment> + '_ {
        self.segments.values()
    }

    pub fn external_connection_count(&self) -> usize {
        self.segments
            .values()
            .map(|s| s.external[0].len() + s.external[1].len())
            .sum()
    }
}
