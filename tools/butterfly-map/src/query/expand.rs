//! Expansion of grouping items into their routeable items

use std::collections::BTreeSet;

use butterfly_common::ReplyStatus;

use super::QueryProcessor;
use crate::item::{Item, ItemId, ItemType, PoiType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandReply {
    pub status: ReplyStatus,
    /// Routeable items, sorted by id
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestMatchReply {
    pub status: ReplyStatus,
    pub item_id: Option<ItemId>,
    pub offset: u16,
}

impl QueryProcessor<'_> {
    fn routeable_members(&self, group: ItemId, out: &mut BTreeSet<ItemId>) {
        let map = self.map();
        for &member in map.group_members(group) {
            let Some(item) = map.item_lookup(member) else {
                continue;
            };
            if item.item_type().is_routeable() {
                out.insert(member);
            } else if let Some(segment) = item.as_poi().and_then(|p| p.street_segment) {
                out.insert(segment);
            }
        }
    }

    /// Routeable items making up `item_id`
    pub fn expand_item(&self, item_id: ItemId) -> ExpandReply {
        let map = self.map();
        let Some(item) = map.item_lookup(item_id) else {
            return ExpandReply {
                status: ReplyStatus::NotFound,
                items: Vec::new(),
            };
        };

        let mut out = BTreeSet::new();
        match item.item_type() {
            t if t.is_routeable() => {
                out.insert(item_id);
            }
            ItemType::PointOfInterest => {
                if let Some(segment) = item.as_poi().and_then(|p| p.street_segment) {
                    out.insert(segment);
                }
            }
            ItemType::Street | ItemType::Category => self.routeable_members(item_id, &mut out),
            ItemType::Municipal
            | ItemType::BuiltUpArea
            | ItemType::CityPart
            | ItemType::IndexArea
            | ItemType::ZipCode => {
                self.routeable_members(item_id, &mut out);
                // streets grouped under the area bring their segments
                for &member in map.group_members(item_id) {
                    if map.item_lookup(member).map(Item::item_type) == Some(ItemType::Street) {
                        self.routeable_members(member, &mut out);
                    }
                }
            }
            _ => {
                return ExpandReply {
                    status: ReplyStatus::NotSupported,
                    items: Vec::new(),
                }
            }
        }

        let status = if out.is_empty() {
            ReplyStatus::NotFound
        } else {
            ReplyStatus::Ok
        };
        ExpandReply {
            status,
            items: out.into_iter().collect(),
        }
    }

    /// Single representative position of an area.
    ///
    /// A city-centre POI inside the area wins. Otherwise the longest street
    /// segment shared by the area and its enclosing municipal is used (for a
    /// municipal itself, its longest segment).
    pub fn best_match(&self, item_id: ItemId) -> BestMatchReply {
        let map = self.map();
        let failed = |status| BestMatchReply {
            status,
            item_id: None,
            offset: u16::MAX,
        };
        let Some(item) = map.item_lookup(item_id) else {
            return failed(ReplyStatus::NotFound);
        };
        if !matches!(item.item_type(), ItemType::BuiltUpArea | ItemType::Municipal) {
            return failed(ReplyStatus::NotSupported);
        }

        let anchor = map
            .group_members(item_id)
            .iter()
            .filter_map(|&id| map.item_lookup(id))
            .filter_map(Item::as_poi)
            .find(|poi| poi.poi_type == PoiType::CityCentre && poi.street_segment.is_some());
        if let Some(poi) = anchor {
            return BestMatchReply {
                status: ReplyStatus::Ok,
                item_id: poi.street_segment,
                offset: poi.offset,
            };
        }

        let mut own = BTreeSet::new();
        self.expand_into(item_id, &mut own);
        let shared: BTreeSet<ItemId> = match map.get_region(item, ItemType::Municipal) {
            Some(municipal) if item.item_type() == ItemType::BuiltUpArea => {
                let mut outer = BTreeSet::new();
                self.expand_into(municipal.id(), &mut outer);
                own.intersection(&outer).copied().collect()
            }
            _ => own,
        };

        let longest = shared
            .iter()
            .filter_map(|&id| map.item_lookup(id))
            .filter(|i| i.item_type() == ItemType::StreetSegment)
            .max_by(|a, b| a.length_m().total_cmp(&b.length_m()).then(b.id().cmp(&a.id())));
        match longest {
            Some(segment) => BestMatchReply {
                status: ReplyStatus::Ok,
                item_id: Some(segment.id()),
                offset: u16::MAX / 2,
            },
            None => failed(ReplyStatus::NotFound),
        }
    }

    fn expand_into(&self, item_id: ItemId, out: &mut BTreeSet<ItemId>) {
        out.extend(self.expand_item(item_id).items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::geo::Coord;
    use crate::item::Geometry;
    use crate::map::MapAggregate;

    fn segment(map: &mut MapAggregate, len_deg: f64) -> ItemId {
        map.add_item(
            13,
            Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                Coord::from_degrees(50.0, 4.0),
                Coord::from_degrees(50.0, 4.0 + len_deg),
            ])),
        )
        .unwrap()
    }

    #[test]
    fn street_expands_to_its_segments() {
        let mut map = MapAggregate::new(1, 0);
        let municipal = map.add_item(2, Item::new(ItemType::Municipal)).unwrap();
        let street = map.add_item(9, Item::new(ItemType::Street)).unwrap();
        let a = segment(&mut map, 0.001);
        let b = segment(&mut map, 0.002);
        map.add_group(a, street).unwrap();
        map.add_group(b, street).unwrap();
        map.add_group(street, municipal).unwrap();
        let config = QueryConfig::default();
        let q = QueryProcessor::new(&map, &config);

        assert_eq!(q.expand_item(street).items, vec![a, b]);
        assert_eq!(q.expand_item(municipal).items, vec![a, b]);
        assert_eq!(q.expand_item(a).items, vec![a]);
        let missing = ItemId::new(0, 0);
        assert_eq!(q.expand_item(missing).status, ReplyStatus::NotFound);
    }

    #[test]
    fn best_match_prefers_city_centre_then_longest_shared_segment() {
        let mut map = MapAggregate::new(1, 0);
        let municipal = map.add_item(2, Item::new(ItemType::Municipal)).unwrap();
        let bua = map.add_item(3, Item::new(ItemType::BuiltUpArea)).unwrap();
        map.add_group(bua, municipal).unwrap();
        let short = segment(&mut map, 0.001);
        let long_outside = segment(&mut map, 0.005);
        let long_shared = segment(&mut map, 0.003);
        for seg in [short, long_shared] {
            map.add_group(seg, bua).unwrap();
            map.add_group(seg, municipal).unwrap();
        }
        map.add_group(long_outside, bua).unwrap();

        let config = QueryConfig::default();
        let reply = QueryProcessor::new(&map, &config).best_match(bua);
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.item_id, Some(long_shared));

        let mut centre = Item::new(ItemType::PointOfInterest).with_group(bua);
        let poi = centre.as_poi_mut().unwrap();
        poi.poi_type = PoiType::CityCentre;
        poi.street_segment = Some(short);
        poi.offset = 1000;
        map.add_item(14, centre).unwrap();
        let reply = QueryProcessor::new(&map, &config).best_match(bua);
        assert_eq!(reply.item_id, Some(short));
        assert_eq!(reply.offset, 1000);
    }
}
