//! Graph export: one map's routing graph as a self-contained block stream
//!
//! The stream holds no ids that need resolving against the map: nodes are
//! emitted once, sorted by id, and every connection refers to them by their
//! 0-based index in that array. Blocks are written strictly in order:
//!
//! 1. hierarchy: `(level, map_id)` of this map, then of its overview maps
//! 2. multi-connections: `first, last, n, n x node id`
//! 3. nodes: `node id, entry restriction, lat, lon`
//! 4. forward connections: `from_idx, to_idx, cost a..d, restrictions`,
//!    sorted by from index
//! 5. backward connections: `to_idx, from_idx, forward record index`,
//!    sorted by to index
//! 6. external nodes: `node_idx, node id, external connection count`
//! 7. external connections: `from map, from node ^ 0x80000000, 0, 0, 0, 0,
//!    0xffffffff`, grouped per external node
//! 8. overview maps only: id translation `overview item, true map, true item`
//!
//! A failed write aborts the export; a partial stream cannot be resumed.

pub mod block;
pub mod server;

use std::io::Write;

use bytes::BufMut;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::Coord;
use crate::graph::NodeId;
use crate::item::ItemType;
use crate::map::MapAggregate;

pub use block::{split_blocks, BlockWriter, RawBlock};

/// Restriction mask of external connection records
pub const EXTERNAL_RESTRICTIONS: u32 = 0xffff_ffff;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("map {map_id:09}: connection refers to unknown node {node}")]
    DanglingIndex { map_id: u32, node: NodeId },

    #[error("{stage} block exceeds the 32-bit size limit")]
    BlockTooLarge { stage: &'static str },

    #[error("export stream truncated")]
    Truncated,
}

/// Record counts of one export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub overview_levels: usize,
    pub multi_connections: usize,
    pub nodes: usize,
    pub connections: usize,
    pub external_nodes: usize,
    pub external_connections: usize,
    pub translations: usize,
    pub bytes: usize,
}

/// Serializes one map's graph
pub struct GraphExport<'a> {
    map: &'a MapAggregate,
}

impl<'a> GraphExport<'a> {
    pub fn new(map: &'a MapAggregate) -> Self {
        Self { map }
    }

    pub fn run<W: Write>(&self, out: &mut W) -> Result<ExportSummary, ExportError> {
        let mut summary = ExportSummary::default();

        summary.bytes += self.write_hierarchy(out, &mut summary)?;
        summary.bytes += self.write_multi_connections(out, &mut summary)?;
        let (nodes, index) = self.collect_nodes();
        summary.bytes += self.write_nodes(out, &nodes, &mut summary)?;
        summary.bytes += self.write_connections(out, &index, &mut summary)?;
        summary.bytes += self.write_external(out, &index, &mut summary)?;
        if self.map.is_overview() {
            summary.bytes += self.write_translations(out, &mut summary)?;
        }
        out.flush()?;

        info!(
            map_id = self.map.map_id(),
            nodes = summary.nodes,
            connections = summary.connections,
            external_nodes = summary.external_nodes,
            bytes = summary.bytes,
            "graph export finished"
        );
        Ok(summary)
    }

    /// Whole export in memory
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut out = Vec::new();
        self.run(&mut out)?;
        Ok(out)
    }

    fn write_hierarchy<W: Write>(&self, out: &mut W, summary: &mut ExportSummary) -> Result<usize, ExportError> {
        let mut block = BlockWriter::new();
        let rec = block.record();
        rec.put_u32(self.map.level() as u32);
        rec.put_u32(self.map.map_id());
        for &(level, map_id) in self.map.overview_maps() {
            let rec = block.record();
            rec.put_u32(level as u32);
            rec.put_u32(map_id);
        }
        summary.overview_levels = self.map.overview_maps().len();
        debug!(map_id = self.map.map_id(), levels = block.count(), "hierarchy stage");
        block.finish("hierarchy", out)
    }

    fn write_multi_connections<W: Write>(
        &self,
        out: &mut W,
        summary: &mut ExportSummary,
    ) -> Result<usize, ExportError> {
        let mut block = BlockWriter::new();
        for (first, last, intermediate) in self.map.expansion().iter() {
            let rec = block.record();
            rec.put_u32(first.raw());
            rec.put_u32(last.raw());
            rec.put_u32(intermediate.len() as u32);
            for node in intermediate {
                rec.put_u32(node.raw());
            }
        }
        summary.multi_connections = block.count();
        debug!(map_id = self.map.map_id(), count = block.count(), "multi-connection stage");
        block.finish("multi-connections", out)
    }

    /// Nodes sorted by id with their coordinate, plus the id -> index table
    fn collect_nodes(&self) -> (Vec<(NodeId, u32, Coord)>, FxHashMap<NodeId, u32>) {
        let graph = self.map.graph();
        let mut nodes: Vec<(NodeId, u32, Coord)> = graph
            .nodes()
            .map(|node| {
                let coords = self
                    .map
                    .item_lookup(node.id.item())
                    .and_then(|item| item.usable_geometry())
                    .map(|g| g.coords.as_slice())
                    .unwrap_or_default();
                let coord = if node.id.is_node1() {
                    coords.last()
                } else {
                    coords.first()
                };
                (node.id, node.entry_restriction as u32, coord.copied().unwrap_or(Coord::UNKNOWN))
            })
            .collect();
        nodes.sort_unstable_by_key(|&(id, _, _)| id);
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, &(id, _, _))| (id, i as u32))
            .collect();
        (nodes, index)
    }

    fn write_nodes<W: Write>(
        &self,
        out: &mut W,
        nodes: &[(NodeId, u32, Coord)],
        summary: &mut ExportSummary,
    ) -> Result<usize, ExportError> {
        let mut block = BlockWriter::new();
        for &(id, restriction, coord) in nodes {
            if coord.is_unknown() {
                warn!(map_id = self.map.map_id(), node_id = %id, "node without geometry");
            }
            let rec = block.record();
            rec.put_u32(id.raw());
            rec.put_u32(restriction);
            rec.put_i32(coord.lat);
            rec.put_i32(coord.lon);
        }
        summary.nodes = block.count();
        debug!(map_id = self.map.map_id(), count = block.count(), "node stage");
        block.finish("nodes", out)
    }

    fn node_index(&self, index: &FxHashMap<NodeId, u32>, node: NodeId) -> Result<u32, ExportError> {
        index.get(&node).copied().ok_or(ExportError::DanglingIndex {
            map_id: self.map.map_id(),
            node,
        })
    }

    /// Forward records with full cost data, then backward records pointing
    /// at them by position
    fn write_connections<W: Write>(
        &self,
        out: &mut W,
        index: &FxHashMap<NodeId, u32>,
        summary: &mut ExportSummary,
    ) -> Result<usize, ExportError> {
        struct Forward {
            from: u32,
            to: u32,
            cost: [u32; 4],
            restrictions: u32,
        }

        let mut forward = Vec::with_capacity(self.map.graph().connection_count());
        for (to, connection) in self.map.graph().edges() {
            let from_idx = self.node_index(index, connection.from)?;
            let to_idx = self.node_index(index, to)?;
            let cost = self
                .map
                .get_connection_cost(connection, to, false)
                .ok_or(ExportError::DanglingIndex {
                    map_id: self.map.map_id(),
                    node: to,
                })?
                .cost;
            forward.push(Forward {
                from: from_idx,
                to: to_idx,
                cost: [cost.cost_a, cost.cost_b, cost.cost_c, cost.cost_d],
                restrictions: self.map.get_vehicle_restrictions(connection, to),
            });
        }
        // stable: parallel connections keep enumeration order
        forward.sort_by_key(|f| (f.from, f.to));

        let mut block = BlockWriter::new();
        for f in &forward {
            let rec = block.record();
            rec.put_u32(f.from);
            rec.put_u32(f.to);
            for c in f.cost {
                rec.put_u32(c);
            }
            rec.put_u32(f.restrictions);
        }
        summary.connections = block.count();
        debug!(map_id = self.map.map_id(), count = block.count(), "forward connection stage");
        let mut written = block.finish("forward connections", out)?;

        let mut backward: Vec<(u32, u32, u32)> = forward
            .iter()
            .enumerate()
            .map(|(i, f)| (f.to, f.from, i as u32))
            .collect();
        backward.sort_unstable();
        let mut block = BlockWriter::new();
        for (to, from, data) in backward {
            let rec = block.record();
            rec.put_u32(to);
            rec.put_u32(from);
            rec.put_u32(data);
        }
        debug!(map_id = self.map.map_id(), count = block.count(), "backward connection stage");
        written += block.finish("backward connections", out)?;
        Ok(written)
    }

    /// Boundary nodes receiving connections from other maps.
    ///
    /// A node with both external and local incoming connections breaks the
    /// boundary model: detail maps drop it with a warning, overview maps keep
    /// it and log.
    fn write_external<W: Write>(
        &self,
        out: &mut W,
        index: &FxHashMap<NodeId, u32>,
        summary: &mut ExportSummary,
    ) -> Result<usize, ExportError> {
        let mut nodes = BlockWriter::new();
        let mut connections = BlockWriter::new();
        let map_id = self.map.map_id();

        let mut kept = Vec::new();
        for segment in self.map.boundary().into_iter().flat_map(|b| b.iter()) {
            for node1 in [false, true] {
                let external = segment.external_connections(node1);
                if external.is_empty() {
                    continue;
                }
                let node = NodeId::from_item(segment.item_id, node1);
                let node_idx = self.node_index(index, node)?;
                let internal = self
                    .map
                    .node_lookup(node)
                    .map_or(0, |n| n.connections.len());
                if internal > 0 {
                    if self.map.is_overview() {
                        debug!(map_id, node_id = %node, internal, "overview boundary node with local connections");
                    } else {
                        warn!(
                            map_id,
                            node_id = %node,
                            internal,
                            external = external.len(),
                            "boundary node has local connections, excluded from export"
                        );
                        continue;
                    }
                }

                kept.push((node_idx, node, external));
            }
        }

        // node1 of one item can sort after node0 of the next
        kept.sort_unstable_by_key(|&(node_idx, _, _)| node_idx);
        for (node_idx, node, external) in kept {
            let rec = nodes.record();
            rec.put_u32(node_idx);
            rec.put_u32(node.raw());
            rec.put_u32(external.len() as u32);
            for ext in external {
                let rec = connections.record();
                rec.put_u32(ext.from_map);
                rec.put_u32(ext.connection.from.raw() ^ NodeId::NODE1_BIT);
                rec.put_bytes(0, 16);
                rec.put_u32(EXTERNAL_RESTRICTIONS);
            }
        }

        summary.external_nodes = nodes.count();
        summary.external_connections = connections.count();
        debug!(
            map_id,
            nodes = nodes.count(),
            connections = connections.count(),
            "external stage"
        );
        let written = nodes.finish("external nodes", out)?;
        Ok(written + connections.finish("external connections", out)?)
    }

    fn write_translations<W: Write>(
        &self,
        out: &mut W,
        summary: &mut ExportSummary,
    ) -> Result<usize, ExportError> {
        let mut block = BlockWriter::new();
        for (&overview_item, &(true_map, true_item)) in self.map.id_translation() {
            let routeable = self.map.item_lookup(overview_item).is_some_and(|i| {
                matches!(i.item_type(), ItemType::StreetSegment | ItemType::Ferry)
            });
            if !routeable {
                continue;
            }
            let rec = block.record();
            rec.put_u32(overview_item.raw());
            rec.put_u32(true_map);
            rec.put_u32(true_item.raw());
        }
        summary.translations = block.count();
        debug!(map_id = self.map.map_id(), count = block.count(), "id translation stage");
        block.finish("id translation", out)
    }
}
