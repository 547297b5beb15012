//! Map aggregate: one loaded map and the queries composed over it
//!
//! Owns the item store (and through it the routing graph), the boundary
//! table, the string table, the node-expansion table and the overview
//! bookkeeping. The spatial hash and the derived membership indexes are built
//! lazily on first use and dropped whenever the map is mutated.

pub mod geometry;
pub mod heading;
pub mod house_number;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use butterfly_common::{Error, Result};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::boundary::BoundaryTable;
use crate::config::SpatialConfig;
use crate::geo::{BBox, Coord};
use crate::graph::{
    Connection, CostEstimate, CostModel, EntryRestriction, Graph, Node, NodeExpansionTable, NodeId,
};
use crate::item::{Item, ItemId, ItemStore, ItemType, ItemTypeSet, Name, NameType};
use crate::spatial::SpatialHash;
use crate::strings::StringTable;

pub use heading::HeadingMatch;
pub use house_number::{HouseNumberMatch, Side};

/// Heading value meaning "any direction"
pub const OMNIDIRECTIONAL: i32 = 32767;

/// Indexes derived from the item store, rebuilt after mutation
#[derive(Debug, Default)]
pub struct DerivedIndex {
    /// Group item -> items listing it in their group list
    pub members: FxHashMap<ItemId, Vec<ItemId>>,
    /// Street segment -> POIs placed on it
    pub segment_pois: FxHashMap<ItemId, Vec<ItemId>>,
    /// Node -> `(to_node, connection)` pairs leaving it
    pub outgoing: FxHashMap<NodeId, Vec<(NodeId, Connection)>>,
}

impl DerivedIndex {
    fn build(items: &ItemStore) -> Self {
        let mut index = DerivedIndex::default();
        for item in items.iter() {
            for &group in &item.groups {
                index.members.entry(group).or_default().push(item.id());
            }
            if let Some(segment) = item.as_poi().and_then(|p| p.street_segment) {
                index.segment_pois.entry(segment).or_default().push(item.id());
            }
        }
        for (to, connection) in Graph::new(items).edges() {
            index
                .outgoing
                .entry(connection.from)
                .or_default()
                .push((to, *connection));
        }
        debug!(
            groups = index.members.len(),
            segments_with_pois = index.segment_pois.len(),
            "derived indexes built"
        );
        index
    }
}

#[derive(Debug)]
pub struct MapAggregate {
    map_id: u32,
    /// 0 for detail maps, higher for overview maps
    level: u8,
    items: ItemStore,
    strings: StringTable,
    /// Absent for country-level maps
    boundary: Option<BoundaryTable>,
    expansion: NodeExpansionTable,
    /// Overview maps covering this one, `(level, map_id)`
    overview_maps: Vec<(u8, u32)>,
    /// Overview item -> `(true map id, true item id)`
    id_translation: BTreeMap<ItemId, (u32, ItemId)>,
    spatial_config: SpatialConfig,
    cost_model: CostModel,
    spatial: OnceLock<SpatialHash>,
    derived: OnceLock<DerivedIndex>,
}

impl MapAggregate {
    /// Empty map with a boundary table
    pub fn new(map_id: u32, level: u8) -> Self {
        Self {
            map_id,
            level,
            items: ItemStore::new(),
            strings: StringTable::new(),
            boundary: Some(BoundaryTable::new()),
            expansion: NodeExpansionTable::new(),
            overview_maps: Vec::new(),
            id_translation: BTreeMap::new(),
            spatial_config: SpatialConfig::default(),
            cost_model: CostModel::default(),
            spatial: OnceLock::new(),
            derived: OnceLock::new(),
        }
    }

    /// Empty country-level map: no neighbours, hence no boundary table
    pub fn country(map_id: u32, level: u8) -> Self {
        Self {
            boundary: None,
            ..Self::new(map_id, level)
        }
    }

    pub fn with_spatial_config(mut self, config: SpatialConfig) -> Self {
        self.spatial_config = config;
        self.spatial.take();
        self
    }

    pub fn with_cost_model(mut self, model: CostModel) -> Self {
        self.cost_model = model;
        self
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_overview(&self) -> bool {
        self.level > 0
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn boundary(&self) -> Option<&BoundaryTable> {
        self.boundary.as_ref()
    }

    pub fn expansion(&self) -> &NodeExpansionTable {
        &self.expansion
    }

    pub fn overview_maps(&self) -> &[(u8, u32)] {
        &self.overview_maps
    }

    pub fn id_translation(&self) -> &BTreeMap<ItemId, (u32, ItemId)> {
        &self.id_translation
    }

    pub fn spatial_config(&self) -> &SpatialConfig {
        &self.spatial_config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn graph(&self) -> Graph<'_> {
        Graph::new(&self.items)
    }

    /// Spatial hash, built on first use
    pub fn spatial(&self) -> &SpatialHash {
        self.spatial
            .get_or_init(|| SpatialHash::build(&self.items, &self.spatial_config))
    }

    /// Membership and outgoing-connection indexes, built on first use
    pub fn derived(&self) -> &DerivedIndex {
        self.derived.get_or_init(|| DerivedIndex::build(&self.items))
    }

    fn invalidate(&mut self) {
        self.spatial.take();
        self.derived.take();
    }

    // ---- item store ----

    pub fn get_item(&self, zoom: u8, index: u32) -> Option<&Item> {
        self.items.get_item(zoom, index)
    }

    pub fn item_lookup(&self, id: ItemId) -> Option<&Item> {
        self.items.item_lookup(id)
    }

    pub fn nbr_items_with_zoom(&self, zoom: u8) -> u32 {
        self.items.nbr_items_with_zoom(zoom)
    }

    /// Looks an id up and fails with [`Error::ItemNotFound`] when absent
    pub fn require_item(&self, id: ItemId) -> Result<&Item> {
        self.items.item_lookup(id).ok_or(Error::ItemNotFound {
            map_id: self.map_id,
            item_id: id.raw(),
        })
    }

    // ---- generation ----

    pub fn add_item(&mut self, zoom: u8, item: Item) -> Result<ItemId> {
        let id = self.items.add_item(zoom, item).ok_or_else(|| {
            Error::InvalidInput(format!("zoom level {zoom} cannot take another item"))
        })?;
        self.invalidate();
        Ok(id)
    }

    /// Places an item at a fixed id (map loading)
    pub(crate) fn insert_item_at(&mut self, id: ItemId, item: Item) {
        self.items.insert_at(id, item);
        self.invalidate();
    }

    pub(crate) fn reserve_slots(&mut self, zoom: u8, len: u32) {
        self.items.reserve_slots(zoom, len);
    }

    /// Removes an item together with every reference to it: group entries,
    /// connections from its nodes, its boundary segment and multi-connections
    /// starting or ending on its nodes.
    pub fn remove_item(&mut self, id: ItemId) -> Option<Item> {
        let removed = self.items.remove_item(id)?;
        for item in self.items.iter_mut() {
            item.groups.retain(|&g| g != id);
            if let Some(road) = item.as_routeable_mut() {
                for node in road.nodes.iter_mut() {
                    node.connections.retain(|c| c.from.item() != id);
                }
            }
            if let Some(poi) = item.as_poi_mut() {
                if poi.street_segment == Some(id) {
                    poi.street_segment = None;
                }
            }
        }
        if let Some(boundary) = self.boundary.as_mut() {
            boundary.remove(id);
        }
        self.id_translation.remove(&id);
        self.expansion.remove_item(id);
        self.invalidate();
        Some(removed)
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut Node> {
        let map_id = self.map_id;
        self.items
            .item_lookup_mut(node.item())
            .and_then(|item| item.as_routeable_mut())
            .map(|road| road.node_mut(node.is_node1()))
            .ok_or(Error::ItemNotFound {
                map_id,
                item_id: node.item().raw(),
            })
    }

    /// Appends a local connection to `to`'s incoming list. Connections from
    /// other maps go through [`MapAggregate::add_boundary_connection`].
    pub fn add_connection(&mut self, to: NodeId, connection: Connection) -> Result<()> {
        if self.graph().node_lookup(connection.from).is_none() {
            return Err(Error::ItemNotFound {
                map_id: self.map_id,
                item_id: connection.from.item().raw(),
            });
        }
        self.node_mut(to)?.connections.push(connection);
        self.invalidate();
        Ok(())
    }

    pub fn set_entry_restriction(&mut self, node: NodeId, restriction: EntryRestriction) -> Result<()> {
        self.node_mut(node)?.entry_restriction = restriction;
        Ok(())
    }

    /// Records a connection from `from_map` into local `to`. Returns false
    /// when another foreign map already owns connections into that node.
    pub fn add_boundary_connection(
        &mut self,
        from_map: u32,
        connection: Connection,
        to: NodeId,
    ) -> Result<bool> {
        if self.graph().node_lookup(to).is_none() {
            return Err(Error::ItemNotFound {
                map_id: self.map_id,
                item_id: to.item().raw(),
            });
        }
        let map_id = self.map_id;
        let boundary = self.boundary.as_mut().ok_or_else(|| {
            Error::InvalidInput(format!("map {map_id:09} has no boundary table"))
        })?;
        Ok(boundary.add_connection(from_map, connection, to))
    }

    /// Adds a name, storing the string in the deduplicated table
    pub fn add_name(&mut self, id: ItemId, language: u8, kind: NameType, name: &str) -> Result<()> {
        let string_index = self.strings.add(name);
        let map_id = self.map_id;
        let item = self.items.item_lookup_mut(id).ok_or(Error::ItemNotFound {
            map_id,
            item_id: id.raw(),
        })?;
        item.names.push(Name {
            string_index,
            language,
            kind,
        });
        Ok(())
    }

    pub fn add_group(&mut self, id: ItemId, group: ItemId) -> Result<()> {
        self.require_item(group)?;
        let map_id = self.map_id;
        let item = self.items.item_lookup_mut(id).ok_or(Error::ItemNotFound {
            map_id,
            item_id: id.raw(),
        })?;
        if !item.groups.contains(&group) {
            item.groups.push(group);
        }
        self.invalidate();
        Ok(())
    }

    pub fn add_multi_connection(&mut self, first: NodeId, last: NodeId, intermediate: Vec<NodeId>) {
        if self.expansion.add(first, last, intermediate).is_some() {
            warn!(map_id = self.map_id, first = %first, last = %last, "multi-connection replaced");
        }
    }

    pub fn add_overview_map(&mut self, level: u8, map_id: u32) {
        if !self.overview_maps.contains(&(level, map_id)) {
            self.overview_maps.push((level, map_id));
        }
    }

    pub fn add_id_translation(&mut self, overview_item: ItemId, true_map: u32, true_item: ItemId) {
        self.id_translation.insert(overview_item, (true_map, true_item));
    }

    pub(crate) fn set_strings(&mut self, strings: StringTable) {
        self.strings = strings;
    }

    pub(crate) fn set_boundary(&mut self, boundary: Option<BoundaryTable>) {
        self.boundary = boundary;
    }

    pub(crate) fn set_expansion(&mut self, expansion: NodeExpansionTable) {
        self.expansion = expansion;
    }

    // ---- graph ----

    pub fn node_lookup(&self, node: NodeId) -> Option<&Node> {
        self.graph().node_lookup(node)
    }

    pub fn get_connection_cost(
        &self,
        connection: &Connection,
        to: NodeId,
        external: bool,
    ) -> Option<CostEstimate> {
        self.graph()
            .connection_cost(&self.cost_model, connection, to, external)
    }

    pub fn get_vehicle_restrictions(&self, connection: &Connection, to: NodeId) -> u32 {
        self.graph().vehicle_restrictions(connection, to)
    }

    pub fn expand_node_ids(&self, path: &[NodeId]) -> Vec<NodeId> {
        self.expansion.expand_node_ids(path)
    }

    /// Connections leaving `node`, as `(to_node, connection)`
    pub fn outgoing(&self, node: NodeId) -> &[(NodeId, Connection)] {
        self.derived()
            .outgoing
            .get(&node)
            .map_or(&[], Vec::as_slice)
    }

    // ---- spatial ----

    /// Closest item of an allowed type, `None` beyond the index's search range
    pub fn get_closest_item_id(&self, p: Coord, types: ItemTypeSet) -> Option<(ItemId, f64)> {
        self.spatial().get_closest(&self.items, p, types)
    }

    pub fn get_all_within_radius(
        &self,
        p: Coord,
        radius_m: f64,
        types: ItemTypeSet,
    ) -> std::collections::BTreeSet<ItemId> {
        self.spatial()
            .get_all_within_radius(&self.items, p, radius_m, types)
    }

    pub fn get_all_within_bbox(&self, bbox: &BBox, types: ItemTypeSet) -> std::collections::BTreeSet<ItemId> {
        self.spatial().get_all_within_bbox(&self.items, bbox, types)
    }

    // ---- groups and names ----

    /// First group of `item` with the wanted type
    pub fn get_region(&self, item: &Item, region_type: ItemType) -> Option<&Item> {
        item.groups
            .iter()
            .filter_map(|&g| self.items.item_lookup(g))
            .find(|g| g.item_type() == region_type)
    }

    /// Every group of `item` with the wanted type, in group-list order
    pub fn get_regions(&self, item: &Item, region_type: ItemType) -> Vec<&Item> {
        item.groups
            .iter()
            .filter_map(|&g| self.items.item_lookup(g))
            .filter(|g| g.item_type() == region_type)
            .collect()
    }

    /// Like [`MapAggregate::get_region`], also looking one level up through
    /// the item's own groups (segment -> street -> municipal)
    pub fn find_region(&self, item: &Item, region_type: ItemType) -> Option<&Item> {
        self.get_region(item, region_type).or_else(|| {
            item.groups
                .iter()
                .filter_map(|&g| self.items.item_lookup(g))
                .find_map(|g| self.get_region(g, region_type))
        })
    }

    pub fn group_members(&self, group: ItemId) -> &[ItemId] {
        self.derived()
            .members
            .get(&group)
            .map_or(&[], Vec::as_slice)
    }

    pub fn pois_on_segment(&self, segment: ItemId) -> &[ItemId] {
        self.derived()
            .segment_pois
            .get(&segment)
            .map_or(&[], Vec::as_slice)
    }

    /// Resolved names of an item as `(language, kind, text)`
    pub fn item_names<'a>(&'a self, item: &'a Item) -> impl Iterator<Item = (u8, NameType, &'a str)> + 'a {
        item.names
            .iter()
            .filter_map(|n| self.strings.get(n.string_index).map(|s| (n.language, n.kind, s)))
    }

    /// Official name if any, else the first resolvable one
    pub fn best_name<'a>(&'a self, item: &'a Item) -> Option<&'a str> {
        self.item_names(item)
            .find(|(_, kind, _)| *kind == NameType::Official)
            .or_else(|| self.item_names(item).next())
            .map(|(_, _, s)| s)
    }

    /// Checks that every id referenced by a group list, a connection, a POI
    /// or a boundary segment resolves inside this map.
    pub fn validate(&self) -> Result<()> {
        let graph = self.graph();
        for item in self.items.iter() {
            for &group in &item.groups {
                if self.items.item_lookup(group).is_none() {
                    return Err(Error::corrupt(
                        self.map_id,
                        format!("item {} lists missing group {}", item.id(), group),
                    ));
                }
            }
            if let Some(segment) = item.as_poi().and_then(|p| p.street_segment) {
                if graph.routeable(segment).is_none() {
                    return Err(Error::corrupt(
                        self.map_id,
                        format!("poi {} sits on missing segment {}", item.id(), segment),
                    ));
                }
            }
        }
        for (to, connection) in graph.edges() {
            if graph.node_lookup(connection.from).is_none() {
                return Err(Error::corrupt(
                    self.map_id,
                    format!("node {} has a connection from missing node {}", to, connection.from),
                ));
            }
        }
        if let Some(boundary) = &self.boundary {
            for segment in boundary.iter() {
                if graph.routeable(segment.item_id).is_none() {
                    return Err(Error::corrupt(
                        self.map_id,
                        format!("boundary segment {} is not a routeable item", segment.item_id),
                    ));
                }
            }
        }
        for (first, last, _) in self.expansion.iter() {
            if graph.node_lookup(first).is_none() || graph.node_lookup(last).is_none() {
                return Err(Error::corrupt(
                    self.map_id,
                    format!("multi-connection {first}->{last} names a missing node"),
                ));
            }
        }
        Ok(())
    }
}
