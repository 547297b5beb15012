//! Nearest street segment with heading disambiguation
//!
//! Candidates within a fixed radius are scored by
//! `d² + weight * mismatch² (+ restriction penalty)`, where `mismatch` is the
//! angle between the requested heading and the segment tangent at the
//! projected point, taken in whichever travel direction fits best. Lowest
//! score wins; equal scores keep encounter order.

use tracing::trace;

use super::geometry::{project_on_polyline, tangent_at};
use super::{MapAggregate, OMNIDIRECTIONAL};
use crate::config::QueryConfig;
use crate::geo::{heading_difference, Coord};
use crate::graph::NodeId;
use crate::item::{ItemId, ItemType, ItemTypeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingMatch {
    pub item_id: ItemId,
    pub offset: u16,
    pub squared_distance: f64,
    pub score: f64,
    /// Node matching the travel direction implied by the heading
    pub node: NodeId,
}

/// Valid compass heading, or the omnidirectional marker
pub fn is_heading_usable(heading: i32) -> bool {
    (0..=360).contains(&heading) || heading == OMNIDIRECTIONAL
}

impl MapAggregate {
    /// Street segments around `p` ranked by score, best first
    pub fn rank_street_segments(&self, p: Coord, heading: i32, config: &QueryConfig) -> Vec<HeadingMatch> {
        let types = ItemTypeSet::of(&[ItemType::StreetSegment]);
        let candidates = self.get_all_within_radius(p, config.heading_search_radius_m, types);
        let omnidirectional = heading == OMNIDIRECTIONAL || !(0..=360).contains(&heading);

        let mut ranked: Vec<HeadingMatch> = candidates
            .into_iter()
            .filter_map(|id| {
                let item = self.item_lookup(id)?;
                let road = item.as_routeable()?;
                let coords = &item.usable_geometry()?.coords;
                let proj = project_on_polyline(coords, p)?;
                if omnidirectional {
                    return Some(HeadingMatch {
                        item_id: id,
                        offset: proj.offset,
                        squared_distance: proj.squared_distance,
                        score: proj.squared_distance,
                        node: id.node0(),
                    });
                }

                let (mismatch, against_polyline) = match tangent_at(coords, proj.segment) {
                    Some(tangent) => {
                        let diff = heading_difference(heading as f64, tangent);
                        if diff <= 90.0 {
                            (diff, false)
                        } else {
                            (180.0 - diff, true)
                        }
                    }
                    None => (90.0, false),
                };
                let mut score = proj.squared_distance + config.heading_weight * mismatch * mismatch;
                if road.is_restricted(against_polyline) {
                    score += config.restriction_penalty;
                }
                trace!(item_id = %id, mismatch, score, "heading candidate");
                Some(HeadingMatch {
                    item_id: id,
                    offset: proj.offset,
                    squared_distance: proj.squared_distance,
                    score,
                    node: if against_polyline { id.node1() } else { id.node0() },
                })
            })
            .collect();

        ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
        ranked
    }

    /// Best street segment for a position and heading, if any lies within
    /// the search radius
    pub fn get_best_street_segment_item(
        &self,
        p: Coord,
        heading: i32,
        config: &QueryConfig,
    ) -> Option<HeadingMatch> {
        self.rank_street_segments(p, heading, config).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntryRestriction;
    use crate::item::{Geometry, Item};

    /// Two segments crossing at right angles around (50.0, 4.0)
    fn crossing() -> (MapAggregate, ItemId, ItemId) {
        let mut map = MapAggregate::new(1, 0);
        let east_west = map
            .add_item(
                13,
                Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                    Coord::from_degrees(50.0, 3.9995),
                    Coord::from_degrees(50.0, 4.0005),
                ])),
            )
            .unwrap();
        let south_north = map
            .add_item(
                13,
                Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                    Coord::from_degrees(49.9997, 4.0),
                    Coord::from_degrees(50.0003, 4.0),
                ])),
            )
            .unwrap();
        (map, east_west, south_north)
    }

    #[test]
    fn heading_picks_matching_tangent() {
        let (map, east_west, south_north) = crossing();
        let config = QueryConfig::default();
        // equidistant from both segments
        let p = Coord::from_degrees(50.00005, 4.00008);
        let east = map.get_best_street_segment_item(p, 90, &config).unwrap();
        assert_eq!(east.item_id, east_west);
        assert_eq!(east.node, east_west.node0());
        let north = map.get_best_street_segment_item(p, 0, &config).unwrap();
        assert_eq!(north.item_id, south_north);
        let south = map.get_best_street_segment_item(p, 180, &config).unwrap();
        assert_eq!(south.item_id, south_north);
        assert_eq!(south.node, south_north.node1());
    }

    #[test]
    fn omnidirectional_uses_distance_only() {
        let (map, east_west, _) = crossing();
        let config = QueryConfig::default();
        // 2 m from east_west, ~6 m from south_north
        let p = Coord::from_degrees(50.000018, 4.00008);
        let best = map
            .get_best_street_segment_item(p, OMNIDIRECTIONAL, &config)
            .unwrap();
        assert_eq!(best.item_id, east_west);
        assert_eq!(best.score, best.squared_distance);
        let ranked = map.rank_street_segments(p, 0, &config);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn restricted_direction_is_penalised() {
        let (mut map, east_west, _) = crossing();
        let config = QueryConfig::default();
        let p = Coord::from_degrees(50.0, 4.0003);
        let westbound = map.get_best_street_segment_item(p, 270, &config).unwrap();
        assert_eq!(westbound.item_id, east_west);
        assert_eq!(westbound.node, east_west.node1());

        // one-way eastbound: going west now loses to the crossing street
        map.set_entry_restriction(east_west.node1(), EntryRestriction::NoEntry)
            .unwrap();
        let ranked = map.rank_street_segments(p, 270, &config);
        assert_ne!(ranked[0].item_id, east_west);
        let penalised = ranked.iter().find(|m| m.item_id == east_west).unwrap();
        assert!((penalised.score - westbound.score - config.restriction_penalty).abs() < 1e-6);
    }

    #[test]
    fn nothing_within_radius() {
        let (map, _, _) = crossing();
        let far = Coord::from_degrees(50.01, 4.0);
        assert!(map
            .get_best_street_segment_item(far, 0, &QueryConfig::default())
            .is_none());
    }
}
