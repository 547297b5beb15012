//! Item information with POI/street cross-references

use butterfly_common::ReplyStatus;

use super::position::{resolve_regions, Regions};
use super::QueryProcessor;
use crate::geo::{self, Coord};
use crate::item::{ItemId, ItemType, ItemTypeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemInfoRequest {
    pub item_id: ItemId,
    /// Distances are measured from here; the item's own coordinate when absent
    pub position: Option<Coord>,
    /// Also report POIs and street segments near the position
    pub include_nearby: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemInfo {
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub name: Option<String>,
    pub coord: Coord,
    pub squared_distance: f64,
    pub regions: Regions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemInfoReply {
    pub status: ReplyStatus,
    /// Closest first
    pub items: Vec<ItemInfo>,
}

impl QueryProcessor<'_> {
    pub fn item_info(&self, request: &ItemInfoRequest) -> ItemInfoReply {
        let map = self.map();
        let Some(item) = map.item_lookup(request.item_id) else {
            return ItemInfoReply {
                status: ReplyStatus::NotFound,
                items: Vec::new(),
            };
        };
        let Some(origin) = request
            .position
            .filter(|p| !p.is_unknown())
            .or_else(|| map.get_one_good_coordinate(item))
        else {
            return ItemInfoReply {
                status: ReplyStatus::InternalErrorInMap,
                items: Vec::new(),
            };
        };

        let mut candidates = vec![request.item_id];
        match item.item_type() {
            // POI -> the street it sits on
            ItemType::PointOfInterest => {
                candidates.extend(item.as_poi().and_then(|p| p.street_segment));
            }
            // street segment -> POIs along it
            ItemType::StreetSegment => {
                candidates.extend_from_slice(map.pois_on_segment(request.item_id));
            }
            _ => {}
        }
        if request.include_nearby {
            let nearby = ItemTypeSet::of(&[ItemType::PointOfInterest, ItemType::StreetSegment]);
            candidates.extend(map.get_all_within_radius(origin, self.config().item_info_radius_m, nearby));
        }
        candidates.sort_unstable();
        candidates.dedup();

        let mut items: Vec<ItemInfo> = candidates
            .into_iter()
            .filter_map(|id| {
                let candidate = map.item_lookup(id)?;
                let coord = map.get_one_good_coordinate(candidate)?;
                let squared_distance = candidate
                    .usable_geometry()
                    .and_then(|g| g.squared_distance(origin))
                    .unwrap_or_else(|| geo::squared_distance_m(origin, coord));
                Some(ItemInfo {
                    item_id: id,
                    item_type: candidate.item_type(),
                    name: map.best_name(candidate).map(str::to_owned),
                    coord,
                    squared_distance,
                    regions: resolve_regions(map, candidate),
                })
            })
            .collect();
        items.sort_by(|a, b| a.squared_distance.total_cmp(&b.squared_distance));

        ItemInfoReply {
            status: ReplyStatus::Ok,
            items,
        }
    }
}
