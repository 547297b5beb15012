//! Synthetic maps shared by the integration tests

#![allow(dead_code)]

use butterfly_map::geo::Coord;
use butterfly_map::graph::{Connection, NodeId, TurnDirection};
use butterfly_map::item::{Geometry, Item, ItemId, ItemType, NameType};
use butterfly_map::MapAggregate;

pub const STREET_ZOOM: u8 = 13;
pub const AREA_ZOOM: u8 = 3;

/// Builds small maps one feature at a time
pub struct MapBuilder {
    map: MapAggregate,
}

impl MapBuilder {
    pub fn new(map_id: u32, level: u8) -> Self {
        Self {
            map: MapAggregate::new(map_id, level),
        }
    }

    /// Straight street segment between two `(lat, lon)` points
    pub fn segment(&mut self, from: (f64, f64), to: (f64, f64)) -> ItemId {
        self.polyline(&[from, to])
    }

    pub fn segment_with_flags(&mut self, from: (f64, f64), to: (f64, f64), flags: u16) -> ItemId {
        self.add_street(&[from, to], flags)
    }

    pub fn polyline(&mut self, points: &[(f64, f64)]) -> ItemId {
        self.add_street(points, 0)
    }

    fn add_street(&mut self, points: &[(f64, f64)], flags: u16) -> ItemId {
        let coords = points
            .iter()
            .map(|&(lat, lon)| Coord::from_degrees(lat, lon))
            .collect();
        let mut item = Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(coords));
        if let Some(road) = item.as_routeable_mut() {
            road.flags = flags;
        }
        self.map.add_item(STREET_ZOOM, item).expect("add segment")
    }

    pub fn area(&mut self, item_type: ItemType, name: &str) -> ItemId {
        let id = self
            .map
            .add_item(AREA_ZOOM, Item::new(item_type))
            .expect("add area");
        self.map
            .add_name(id, 0, NameType::Official, name)
            .expect("name area");
        id
    }

    pub fn group(&mut self, member: ItemId, group: ItemId) -> &mut Self {
        self.map.add_group(member, group).expect("add group");
        self
    }

    /// `from`'s traversal continues into `to`
    pub fn connect(&mut self, from: NodeId, to: NodeId, turn: TurnDirection) -> &mut Self {
        self.map
            .add_connection(to, Connection::new(from, turn))
            .expect("add connection");
        self
    }

    pub fn map_mut(&mut self) -> &mut MapAggregate {
        &mut self.map
    }

    pub fn build(self) -> MapAggregate {
        self.map
    }
}

/// A small town: two parallel east-west streets joined by a north-south one
///
/// ```text
///   north  n0 ---- n1
///                   |
///                  link
///                   |
///   south  s0 ---- s1
/// ```
pub struct Town {
    pub map: MapAggregate,
    pub municipal: ItemId,
    pub south: [ItemId; 2],
    pub north: [ItemId; 2],
    pub link: ItemId,
}

pub fn town(map_id: u32) -> Town {
    let mut b = MapBuilder::new(map_id, 0);
    let municipal = b.area(ItemType::Municipal, "Ville");
    let street = b.area(ItemType::Street, "Rue du Midi");

    let south = [
        b.segment((50.0, 4.0), (50.0, 4.002)),
        b.segment((50.0, 4.002), (50.0, 4.004)),
    ];
    let north = [
        b.segment((50.002, 4.0), (50.002, 4.002)),
        b.segment((50.002, 4.002), (50.002, 4.004)),
    ];
    let link = b.segment((50.0, 4.004), (50.002, 4.004));

    for &seg in south.iter().chain(north.iter()).chain([&link]) {
        b.group(seg, municipal);
    }
    for &seg in &south {
        b.group(seg, street);
    }
    b.group(street, municipal);

    b.connect(south[0].node0(), south[1].node0(), TurnDirection::FollowRoad)
        .connect(south[1].node1(), south[0].node1(), TurnDirection::FollowRoad)
        .connect(south[1].node0(), link.node0(), TurnDirection::Left)
        .connect(link.node0(), north[1].node1(), TurnDirection::Left)
        .connect(north[1].node1(), north[0].node1(), TurnDirection::FollowRoad)
        .connect(north[0].node0(), north[1].node0(), TurnDirection::FollowRoad);

    Town {
        map: b.build(),
        municipal,
        south,
        north,
        link,
    }
}
