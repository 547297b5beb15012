//! Map items - the features stored in a map
//!
//! Items are a tagged variant: a closed [`ItemType`] plus a per-variant payload
//! in [`ItemKind`]. Code that needs a subtype goes through the checked
//! downcasts ([`Item::as_routeable`], [`Item::as_poi`], ...) instead of
//! assuming one from the type tag.

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::{self, BBox, Coord};
use crate::graph::{EntryRestriction, Node, NodeId};

pub use store::ItemStore;

/// Number of zoom levels an item id can address
pub const NBR_ZOOM_LEVELS: usize = 16;

const ZOOM_SHIFT: u32 = 27;
const INDEX_MASK: u32 = (1 << ZOOM_SHIFT) - 1;
const ZOOM_MASK: u32 = 0xF;

/// Largest index that fits in the 27-bit index field
pub const MAX_INDEX_IN_ZOOM: u32 = INDEX_MASK;

/// Composite item identifier: 4 bits of zoom level, 27 bits of index.
///
/// Bit 31 is never set on an item id; it is reserved for the node1 flag of
/// [`NodeId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u32);

impl ItemId {
    pub fn new(zoom: u8, index: u32) -> Self {
        debug_assert!((zoom as usize) < NBR_ZOOM_LEVELS);
        debug_assert!(index <= INDEX_MASK);
        ItemId(((zoom as u32 & ZOOM_MASK) << ZOOM_SHIFT) | (index & INDEX_MASK))
    }

    /// Accepts any raw value without the node1 bit
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw & NodeId::NODE1_BIT != 0 {
            None
        } else {
            Some(ItemId(raw))
        }
    }

    /// Drops the node1 bit
    pub(crate) fn from_masked(raw: u32) -> Self {
        ItemId(raw & !NodeId::NODE1_BIT)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn zoom(self) -> u8 {
        ((self.0 >> ZOOM_SHIFT) & ZOOM_MASK) as u8
    }

    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    pub fn node0(self) -> NodeId {
        NodeId::from_item(self, false)
    }

    pub fn node1(self) -> NodeId {
        NodeId::from_item(self, true)
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({}:{})", self.zoom(), self.index())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Closed set of item types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemType {
    StreetSegment = 0,
    Street = 1,
    PointOfInterest = 2,
    Category = 3,
    Building = 4,
    Water = 5,
    Park = 6,
    Municipal = 7,
    BuiltUpArea = 8,
    CityPart = 9,
    Ferry = 10,
    BusRoute = 11,
    IndexArea = 12,
    Railway = 13,
    Island = 14,
    Forest = 15,
    Airport = 16,
    ZipCode = 17,
    Cartographic = 18,
}

impl ItemType {
    pub const ALL: [ItemType; 19] = [
        ItemType::StreetSegment,
        ItemType::Street,
        ItemType::PointOfInterest,
        ItemType::Category,
        ItemType::Building,
        ItemType::Water,
        ItemType::Park,
        ItemType::Municipal,
        ItemType::BuiltUpArea,
        ItemType::CityPart,
        ItemType::Ferry,
        ItemType::BusRoute,
        ItemType::IndexArea,
        ItemType::Railway,
        ItemType::Island,
        ItemType::Forest,
        ItemType::Airport,
        ItemType::ZipCode,
        ItemType::Cartographic,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Items carrying a node pair and taking part in the routing graph
    pub fn is_routeable(self) -> bool {
        matches!(
            self,
            ItemType::StreetSegment | ItemType::Ferry | ItemType::BusRoute
        )
    }

    /// Administrative and grouping items other items point to in their group list
    pub fn is_group(self) -> bool {
        matches!(
            self,
            ItemType::Street
                | ItemType::Category
                | ItemType::Municipal
                | ItemType::BuiltUpArea
                | ItemType::CityPart
                | ItemType::IndexArea
                | ItemType::ZipCode
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemType::StreetSegment => "streetSegment",
            ItemType::Street => "street",
            ItemType::PointOfInterest => "pointOfInterest",
            ItemType::Category => "category",
            ItemType::Building => "building",
            ItemType::Water => "water",
            ItemType::Park => "park",
            ItemType::Municipal => "municipal",
            ItemType::BuiltUpArea => "builtUpArea",
            ItemType::CityPart => "cityPart",
            ItemType::Ferry => "ferry",
            ItemType::BusRoute => "busRoute",
            ItemType::IndexArea => "indexArea",
            ItemType::Railway => "railway",
            ItemType::Island => "island",
            ItemType::Forest => "forest",
            ItemType::Airport => "airport",
            ItemType::ZipCode => "zipCode",
            ItemType::Cartographic => "cartographic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// Bitset of item types, used as a query filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemTypeSet(u32);

impl ItemTypeSet {
    pub const fn empty() -> Self {
        ItemTypeSet(0)
    }

    pub fn all() -> Self {
        ItemTypeSet((1u32 << ItemType::ALL.len()) - 1)
    }

    pub fn of(types: &[ItemType]) -> Self {
        let mut set = Self::empty();
        for &t in types {
            set.insert(t);
        }
        set
    }

    pub fn insert(&mut self, t: ItemType) {
        self.0 |= 1 << t as u8;
    }

    pub fn contains(&self, t: ItemType) -> bool {
        self.0 & (1 << t as u8) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The only member, if the set has exactly one
    pub fn single(&self) -> Option<ItemType> {
        if self.len() == 1 {
            ItemType::from_u8(self.0.trailing_zeros() as u8)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemType> + '_ {
        ItemType::ALL.iter().copied().filter(move |t| self.contains(*t))
    }
}

/// Semantic type of a name
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameType {
    Official = 0,
    Alternative = 1,
    RoadNumber = 2,
    Abbreviation = 3,
    Synonym = 4,
    ExitNumber = 5,
    Invalid = 6,
}

impl NameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(NameType::Official),
            1 => Some(NameType::Alternative),
            2 => Some(NameType::RoadNumber),
            3 => Some(NameType::Abbreviation),
            4 => Some(NameType::Synonym),
            5 => Some(NameType::ExitNumber),
            6 => Some(NameType::Invalid),
            _ => None,
        }
    }
}

/// One name of an item: a string-table index tagged with language and type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    pub string_index: u32,
    pub language: u8,
    pub kind: NameType,
}

/// Geometry of an item: a single point, a polyline or a closed polygon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub coords: Vec<Coord>,
    pub closed: bool,
}

/// Closest point of a geometry to a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Index of the first coordinate of the closest segment
    pub segment: usize,
    /// Position on that segment, in [0, 1]
    pub t: f64,
    pub squared_distance: f64,
}

impl Geometry {
    pub fn point(c: Coord) -> Self {
        Self {
            coords: vec![c],
            closed: false,
        }
    }

    pub fn polyline(coords: Vec<Coord>) -> Self {
        Self {
            coords,
            closed: false,
        }
    }

    pub fn polygon(coords: Vec<Coord>) -> Self {
        Self {
            coords,
            closed: true,
        }
    }

    pub fn is_point(&self) -> bool {
        self.coords.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_coords(&self.coords)
    }

    /// Segment pairs, including the closing edge of polygons
    pub fn segments(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        let closing = if self.closed && self.coords.len() > 2 {
            let (first, last) = (self.coords[0], self.coords[self.coords.len() - 1]);
            (first != last).then_some((last, first))
        } else {
            None
        };
        self.coords.windows(2).map(|w| (w[0], w[1])).chain(closing)
    }

    /// Length in metres along the coordinate order (polygons exclude the closing edge)
    pub fn length_m(&self) -> f64 {
        geo::polyline_length_m(&self.coords)
    }

    /// Even-odd rule point-in-polygon test. Always false for open geometries.
    pub fn contains(&self, p: Coord) -> bool {
        if !self.closed || self.coords.len() < 3 {
            return false;
        }
        let (px, py) = (p.lon as f64, p.lat as f64);
        let mut inside = false;
        for (a, b) in self.segments() {
            let (ax, ay) = (a.lon as f64, a.lat as f64);
            let (bx, by) = (b.lon as f64, b.lat as f64);
            if (ay > py) != (by > py) {
                let x = ax + (py - ay) / (by - ay) * (bx - ax);
                if px < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Closest point along the geometry's edges. `None` for empty geometry.
    pub fn project(&self, p: Coord) -> Option<Projection> {
        match self.coords.len() {
            0 => None,
            1 => Some(Projection {
                segment: 0,
                t: 0.0,
                squared_distance: geo::squared_distance_m(p, self.coords[0]),
            }),
            _ => {
                let mut best: Option<Projection> = None;
                for (i, (a, b)) in self.segments().enumerate() {
                    let (t, d2) = geo::project_on_segment(p, a, b);
                    if best.map_or(true, |b| d2 < b.squared_distance) {
                        best = Some(Projection {
                            segment: i,
                            t,
                            squared_distance: d2,
                        });
                    }
                }
                best
            }
        }
    }

    /// Squared distance to the geometry; zero inside polygons
    pub fn squared_distance(&self, p: Coord) -> Option<f64> {
        if self.contains(p) {
            return Some(0.0);
        }
        self.project(p).map(|proj| proj.squared_distance)
    }
}

/// Road attribute flags of routeable items
pub mod road_flags {
    pub const CONTROLLED_ACCESS: u16 = 1 << 0;
    pub const TOLL: u16 = 1 << 1;
    pub const ROUNDABOUT: u16 = 1 << 2;
    pub const RAMP: u16 = 1 << 3;
    pub const MULTI_DIGITISED: u16 = 1 << 4;
    pub const ROUNDABOUTISH: u16 = 1 << 5;
}

/// House numbering scheme of a street segment
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberingScheme {
    None = 0,
    /// Even numbers on the left side, odd on the right
    LeftEven = 1,
    /// Odd numbers on the left side, even on the right
    LeftOdd = 2,
    /// Any parity on either side
    Mixed = 3,
}

impl NumberingScheme {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(NumberingScheme::None),
            1 => Some(NumberingScheme::LeftEven),
            2 => Some(NumberingScheme::LeftOdd),
            3 => Some(NumberingScheme::Mixed),
            _ => None,
        }
    }
}

/// House number ranges along a street segment, in polyline direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseNumbers {
    pub scheme: NumberingScheme,
    pub left_start: u16,
    pub left_end: u16,
    pub right_start: u16,
    pub right_end: u16,
}

/// Payload of street segments, ferries and bus routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteableItem {
    /// node0 enters at the first coordinate, node1 at the last one
    pub nodes: [Node; 2],
    /// 0 is the top class (motorway); larger is less significant
    pub road_class: u8,
    /// 0 when unknown
    pub speed_limit_kmh: u8,
    pub flags: u16,
    pub house_numbers: Option<HouseNumbers>,
}

impl RouteableItem {
    fn new(id: ItemId) -> Self {
        Self {
            nodes: [Node::new(id.node0()), Node::new(id.node1())],
            road_class: 4,
            speed_limit_kmh: 0,
            flags: 0,
            house_numbers: None,
        }
    }

    pub fn node(&self, node1: bool) -> &Node {
        &self.nodes[node1 as usize]
    }

    pub fn node_mut(&mut self, node1: bool) -> &mut Node {
        &mut self.nodes[node1 as usize]
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn is_roundabout(&self) -> bool {
        self.has_flag(road_flags::ROUNDABOUT)
    }

    pub fn is_controlled_access(&self) -> bool {
        self.has_flag(road_flags::CONTROLLED_ACCESS)
    }

    pub fn is_toll(&self) -> bool {
        self.has_flag(road_flags::TOLL)
    }

    /// Travel against the polyline is forbidden at entry (one-way street)
    pub fn is_restricted(&self, node1: bool) -> bool {
        self.node(node1).entry_restriction != EntryRestriction::NoRestrictions
    }
}

/// Kind of point of interest
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoiType {
    CityCentre = 0,
    Company = 1,
    FuelStation = 2,
    Parking = 3,
    Restaurant = 4,
    TouristAttraction = 5,
    TrafficCamera = 6,
    Other = 7,
}

impl PoiType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PoiType::CityCentre),
            1 => Some(PoiType::Company),
            2 => Some(PoiType::FuelStation),
            3 => Some(PoiType::Parking),
            4 => Some(PoiType::Restaurant),
            5 => Some(PoiType::TouristAttraction),
            6 => Some(PoiType::TrafficCamera),
            7 => Some(PoiType::Other),
            _ => None,
        }
    }
}

/// Payload of points of interest. A POI sits on a street segment at an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoiItem {
    pub poi_type: PoiType,
    pub street_segment: Option<ItemId>,
    pub offset: u16,
}

/// Per-variant payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Plain,
    Routeable(RouteableItem),
    Poi(PoiItem),
    /// Administrative hierarchy level: 7 county, 8 town, 9 locality
    IndexArea { order: u8 },
}

/// One map feature
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: ItemId,
    item_type: ItemType,
    pub names: Vec<Name>,
    pub groups: Vec<ItemId>,
    pub geometry: Option<Geometry>,
    /// Source provenance bitmask
    pub source: u32,
    pub kind: ItemKind,
}

impl Item {
    /// New item with the payload matching its type. The id is assigned by the store.
    pub fn new(item_type: ItemType) -> Self {
        let placeholder = ItemId(0);
        let kind = match item_type {
            t if t.is_routeable() => ItemKind::Routeable(RouteableItem::new(placeholder)),
            ItemType::PointOfInterest => ItemKind::Poi(PoiItem {
                poi_type: PoiType::Other,
                street_segment: None,
                offset: 0,
            }),
            ItemType::IndexArea => ItemKind::IndexArea { order: 0 },
            _ => ItemKind::Plain,
        };
        Self {
            id: placeholder,
            item_type,
            names: Vec::new(),
            groups: Vec::new(),
            geometry: None,
            source: 0,
            kind,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_group(mut self, group: ItemId) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_source(mut self, source: u32) -> Self {
        self.source = source;
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Sets the id and rewrites the node ids of routeable payloads to match
    pub(crate) fn assign_id(&mut self, id: ItemId) {
        self.id = id;
        if let ItemKind::Routeable(r) = &mut self.kind {
            r.nodes[0].id = id.node0();
            r.nodes[1].id = id.node1();
        }
    }

    pub fn as_routeable(&self) -> Option<&RouteableItem> {
        match &self.kind {
            ItemKind::Routeable(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_routeable_mut(&mut self) -> Option<&mut RouteableItem> {
        match &mut self.kind {
            ItemKind::Routeable(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_poi(&self) -> Option<&PoiItem> {
        match &self.kind {
            ItemKind::Poi(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_poi_mut(&mut self) -> Option<&mut PoiItem> {
        match &mut self.kind {
            ItemKind::Poi(p) => Some(p),
            _ => None,
        }
    }

    pub fn index_area_order(&self) -> Option<u8> {
        match self.kind {
            ItemKind::IndexArea { order } => Some(order),
            _ => None,
        }
    }

    /// Geometry with at least one coordinate
    pub fn usable_geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref().filter(|g| !g.is_empty())
    }

    pub fn length_m(&self) -> f64 {
        self.usable_geometry().map_or(0.0, |g| g.length_m())
    }

    pub fn is_member_of(&self, group: ItemId) -> bool {
        self.groups.contains(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_packs_zoom_and_index() {
        let id = ItemId::new(13, 0x123_4567);
        assert_eq!(id.zoom(), 13);
        assert_eq!(id.index(), 0x123_4567);
        assert_eq!(id.raw() & NodeId::NODE1_BIT, 0);
        assert!(ItemId::from_raw(0x8000_0001).is_none());
    }

    #[test]
    fn type_set_single_member() {
        let set = ItemTypeSet::of(&[ItemType::StreetSegment]);
        assert_eq!(set.single(), Some(ItemType::StreetSegment));
        let two = ItemTypeSet::of(&[ItemType::StreetSegment, ItemType::Ferry]);
        assert_eq!(two.single(), None);
        assert_eq!(two.iter().count(), 2);
        assert!(ItemTypeSet::all().contains(ItemType::Cartographic));
    }

    #[test]
    fn routeable_payload_follows_type() {
        let mut item = Item::new(ItemType::Ferry);
        item.assign_id(ItemId::new(2, 5));
        let r = item.as_routeable().expect("ferry is routeable");
        assert_eq!(r.nodes[0].id, ItemId::new(2, 5).node0());
        assert_eq!(r.nodes[1].id, ItemId::new(2, 5).node1());
        assert!(Item::new(ItemType::Park).as_routeable().is_none());
        assert!(Item::new(ItemType::PointOfInterest).as_poi().is_some());
    }

    #[test]
    fn polygon_contains_and_distance() {
        let square = Geometry::polygon(vec![
            Coord::from_degrees(0.0, 0.0),
            Coord::from_degrees(0.0, 0.01),
            Coord::from_degrees(0.01, 0.01),
            Coord::from_degrees(0.01, 0.0),
        ]);
        let inside = Coord::from_degrees(0.005, 0.005);
        assert!(square.contains(inside));
        assert_eq!(square.squared_distance(inside), Some(0.0));
        let outside = Coord::from_degrees(0.005, 0.02);
        assert!(!square.contains(outside));
        let d = square.squared_distance(outside).unwrap().sqrt();
        assert!((d - 1113.2).abs() < 2.0, "got {d}");
    }
}
