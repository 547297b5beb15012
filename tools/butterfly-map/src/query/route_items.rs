//! Routeable sub-items near a feature, for use as route start or end

use std::collections::BTreeMap;

use butterfly_common::ReplyStatus;
use tracing::trace;

use super::QueryProcessor;
use crate::geo::Coord;
use crate::item::{ItemId, ItemType, ItemTypeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteItem {
    pub item_id: ItemId,
    pub offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteItemsReply {
    pub status: ReplyStatus,
    pub items: Vec<RouteItem>,
}

/// At most `max` coordinates spread evenly over `coords`
pub fn sample_coordinates(coords: &[Coord], max: usize) -> Vec<Coord> {
    if coords.len() <= max {
        return coords.to_vec();
    }
    (0..max).map(|i| coords[i * coords.len() / max]).collect()
}

impl QueryProcessor<'_> {
    /// Street segments a router can use to reach `item_id`.
    ///
    /// Routeable items are returned as is and POIs resolve to their segment.
    /// Other items are sampled along their geometry; each sample snaps to the
    /// nearest street segment, and per segment only the lowest and highest
    /// offset hit are kept.
    pub fn route_items(&self, item_id: ItemId) -> RouteItemsReply {
        let map = self.map();
        let config = self.config();
        let Some(item) = map.item_lookup(item_id) else {
            return RouteItemsReply {
                status: ReplyStatus::NotFound,
                items: Vec::new(),
            };
        };

        if item.item_type().is_routeable() {
            return RouteItemsReply {
                status: ReplyStatus::Ok,
                items: vec![RouteItem {
                    item_id,
                    offset: u16::MAX / 2,
                }],
            };
        }
        if let Some(poi) = item.as_poi() {
            if let Some(segment) = poi.street_segment {
                return RouteItemsReply {
                    status: ReplyStatus::Ok,
                    items: vec![RouteItem {
                        item_id: segment,
                        offset: poi.offset,
                    }],
                };
            }
        }

        let samples = match item.usable_geometry() {
            Some(g) => sample_coordinates(&g.coords, config.max_route_item_samples),
            None => map.get_one_good_coordinate(item).into_iter().collect(),
        };

        let types = ItemTypeSet::of(&[ItemType::StreetSegment]);
        let max_d2 = config.route_item_search_radius_m * config.route_item_search_radius_m;
        let mut extremes: BTreeMap<ItemId, (u16, u16)> = BTreeMap::new();
        for sample in samples {
            let Some((segment, d2)) = map.get_closest_item_id(sample, types) else {
                continue;
            };
            if d2 > max_d2 {
                continue;
            }
            let Some(offset) = map
                .item_lookup(segment)
                .and_then(|s| map.get_item_offset(s, sample))
            else {
                continue;
            };
            trace!(item_id = %segment, offset, "route item sample hit");
            extremes
                .entry(segment)
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(offset);
                    *hi = (*hi).max(offset);
                })
                .or_insert((offset, offset));
        }

        let mut items = Vec::with_capacity(extremes.len() * 2);
        for (item_id, (lo, hi)) in extremes {
            items.push(RouteItem { item_id, offset: lo });
            if hi != lo {
                items.push(RouteItem { item_id, offset: hi });
            }
        }
        let status = if items.is_empty() {
            ReplyStatus::NotFound
        } else {
            ReplyStatus::Ok
        };
        RouteItemsReply { status, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::item::{Geometry, Item};
    use crate::map::MapAggregate;

    #[test]
    fn sampling_is_capped_and_even() {
        let coords: Vec<Coord> = (0..200).map(|i| Coord::new(i, 0)).collect();
        let samples = sample_coordinates(&coords, 50);
        assert_eq!(samples.len(), 50);
        assert_eq!(samples[0], coords[0]);
        assert_eq!(samples[1], coords[4]);
        assert_eq!(sample_coordinates(&coords[..10], 50).len(), 10);
    }

    #[test]
    fn lake_keeps_extreme_offsets_per_segment() {
        let mut map = MapAggregate::new(1, 0);
        // road along the south shore
        let road = map
            .add_item(
                13,
                Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                    Coord::from_degrees(50.0, 4.0),
                    Coord::from_degrees(50.0, 4.01),
                ])),
            )
            .unwrap();
        let lake = map
            .add_item(
                6,
                Item::new(ItemType::Water).with_geometry(Geometry::polygon(vec![
                    Coord::from_degrees(50.0005, 4.002),
                    Coord::from_degrees(50.0005, 4.004),
                    Coord::from_degrees(50.0005, 4.006),
                    Coord::from_degrees(50.0015, 4.006),
                    Coord::from_degrees(50.0015, 4.002),
                ])),
            )
            .unwrap();
        let config = QueryConfig::default();
        let reply = QueryProcessor::new(&map, &config).route_items(lake);
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.items.len(), 2);
        assert!(reply.items.iter().all(|r| r.item_id == road));
        assert!(reply.items[0].offset < reply.items[1].offset);
        // 4.002 and 4.006 on a 4.0..4.01 road
        assert!((reply.items[0].offset as i32 - 13107).abs() < 50);
        assert!((reply.items[1].offset as i32 - 39321).abs() < 50);
    }

    #[test]
    fn far_feature_has_no_route_items() {
        let mut map = MapAggregate::new(1, 0);
        map.add_item(
            13,
            Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                Coord::from_degrees(50.0, 4.0),
                Coord::from_degrees(50.0, 4.001),
            ])),
        )
        .unwrap();
        let park = map
            .add_item(6, Item::new(ItemType::Park).with_geometry(Geometry::point(Coord::from_degrees(50.01, 4.0))))
            .unwrap();
        let config = QueryConfig::default();
        let reply = QueryProcessor::new(&map, &config).route_items(park);
        assert_eq!(reply.status, ReplyStatus::NotFound);
    }
}
