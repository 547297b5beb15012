//! Coordinate to nearest item, with enclosing regions

use butterfly_common::ReplyStatus;
use tracing::debug;

use super::QueryProcessor;
use crate::geo::Coord;
use crate::graph::NodeId;
use crate::item::{Item, ItemId, ItemType, ItemTypeSet};
use crate::map::{HouseNumberMatch, MapAggregate};

/// Index-area order levels
const ORDER_COUNTY: u8 = 7;
const ORDER_TOWN: u8 = 8;
const ORDER_LOCALITY: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRequest {
    pub coord: Coord,
    /// Degrees in [0, 360], or 32767 for any direction
    pub heading: i32,
    pub allowed: ItemTypeSet,
}

/// Enclosing administrative areas of an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regions {
    pub municipal: Option<ItemId>,
    pub built_up_area: Option<ItemId>,
    pub city_part: Option<ItemId>,
    pub county: Option<ItemId>,
    pub town: Option<ItemId>,
    pub locality: Option<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReply {
    pub status: ReplyStatus,
    pub item_id: Option<ItemId>,
    /// `u16::MAX` when no offset could be computed
    pub offset: u16,
    pub squared_distance: f64,
    /// Travel direction node, for heading-aware street matches
    pub node: Option<NodeId>,
    pub regions: Regions,
}

impl PositionReply {
    fn failed(status: ReplyStatus) -> Self {
        Self {
            status,
            item_id: None,
            offset: u16::MAX,
            squared_distance: f64::MAX,
            node: None,
            regions: Regions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HouseNumberReply {
    pub status: ReplyStatus,
    pub result: Option<HouseNumberMatch>,
    pub coord: Coord,
}

/// Resolves the enclosing regions of `item`.
///
/// Items inside an index-area hierarchy report county/town/locality by the
/// areas' order level; a locality with a county but no town reports the county
/// as its town.
pub fn resolve_regions(map: &MapAggregate, item: &Item) -> Regions {
    let mut regions = Regions::default();

    let mut areas = map.get_regions(item, ItemType::IndexArea);
    if areas.is_empty() {
        for group in item.groups.iter().filter_map(|&g| map.item_lookup(g)) {
            areas.extend(map.get_regions(group, ItemType::IndexArea));
        }
    }
    if !areas.is_empty() {
        for area in areas {
            let slot = match area.index_area_order() {
                Some(ORDER_COUNTY) => &mut regions.county,
                Some(ORDER_TOWN) => &mut regions.town,
                Some(ORDER_LOCALITY) => &mut regions.locality,
                _ => continue,
            };
            slot.get_or_insert(area.id());
        }
        if regions.locality.is_some() && regions.county.is_some() && regions.town.is_none() {
            regions.town = regions.county.take();
        }
        return regions;
    }

    regions.municipal = map.find_region(item, ItemType::Municipal).map(Item::id);
    regions.built_up_area = map.find_region(item, ItemType::BuiltUpArea).map(Item::id);
    regions.city_part = map.find_region(item, ItemType::CityPart).map(Item::id);
    regions
}

impl QueryProcessor<'_> {
    pub fn nearest_item(&self, request: &PositionRequest) -> PositionReply {
        if request.coord.is_unknown() {
            return PositionReply::failed(ReplyStatus::UnknownPosition);
        }
        if request.allowed.is_empty() {
            return PositionReply::failed(ReplyStatus::NotOk);
        }
        let map = self.map();

        let heading_aware = request.allowed.single() == Some(ItemType::StreetSegment)
            && (0..=360).contains(&request.heading);

        let (item_id, squared_distance, offset, node) = if heading_aware {
            match map.get_best_street_segment_item(request.coord, request.heading, self.config()) {
                Some(m) => (m.item_id, m.squared_distance, Some(m.offset), Some(m.node)),
                None => return PositionReply::failed(ReplyStatus::NotFound),
            }
        } else {
            match map.get_closest_item_id(request.coord, request.allowed) {
                Some((id, d2)) => (id, d2, None, None),
                None => return PositionReply::failed(ReplyStatus::NotFound),
            }
        };

        let Some(item) = map.item_lookup(item_id) else {
            // the index returned an id the store does not hold
            return PositionReply::failed(ReplyStatus::InternalErrorInMap);
        };
        let offset = offset
            .or_else(|| map.get_item_offset(item, request.coord))
            .unwrap_or(u16::MAX);
        debug!(item_id = %item_id, squared_distance, heading_aware, "nearest item");

        PositionReply {
            status: ReplyStatus::Ok,
            item_id: Some(item_id),
            offset,
            squared_distance,
            node,
            regions: resolve_regions(map, item),
        }
    }

    /// Offset and coordinate of a house number on a street segment
    pub fn house_number_position(&self, item_id: ItemId, number: u16) -> HouseNumberReply {
        let failed = |status| HouseNumberReply {
            status,
            result: None,
            coord: Coord::UNKNOWN,
        };
        let Some(item) = self.map().item_lookup(item_id) else {
            return failed(ReplyStatus::NotFound);
        };
        let Some(numbers) = item.as_routeable().and_then(|r| r.house_numbers) else {
            return failed(ReplyStatus::NotSupported);
        };
        let Some(result) = crate::map::house_number::calculate_offset(&numbers, number) else {
            return failed(ReplyStatus::NotFound);
        };
        let coord = self
            .map()
            .get_item_coordinates(item_id, result.offset)
            .unwrap_or(Coord::UNKNOWN);
        HouseNumberReply {
            status: ReplyStatus::Ok,
            result: Some(result),
            coord,
        }
    }
}
