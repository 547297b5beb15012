//! Queue-start search: follow the road network from a queue head until the
//! queue length is used up

use butterfly_common::ReplyStatus;
use tracing::{debug, trace};

use super::QueryProcessor;
use crate::graph::{vehicle, EntryRestriction, NodeId, TurnDirection};
use crate::map::geometry::to_offset;

/// Hard stop for walks over degenerate topologies
const MAX_STEPS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDirection {
    /// Against the traffic flow, towards where the queue came from
    Backward,
    /// With the traffic flow
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStartRequest {
    pub start: NodeId,
    pub direction: QueueDirection,
    pub target_distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// The target distance ends on `node`'s item at `offset`
    Reached { node: NodeId, offset: u16 },
    /// No connection to follow, or no single best one
    DeadEnd { node: NodeId },
    /// The walk leaves this map at `node`; the search continues on `map_id`
    ContinueOnMap { map_id: u32, node: NodeId },
    /// Roundabout or step safety counter fired
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueStartReply {
    pub status: ReplyStatus,
    pub outcome: QueueOutcome,
    /// Distance covered before the outcome, in meters
    pub distance_m: f64,
    /// Visited nodes, start first
    pub path: Vec<NodeId>,
}

/// Preference of a turn when following a queue; higher is better
fn turn_score(turn: TurnDirection) -> u8 {
    match turn {
        TurnDirection::FollowRoad => 5,
        TurnDirection::Ahead => 4,
        TurnDirection::KeepLeft | TurnDirection::KeepRight => 3,
        t if t.is_roundabout() => 2,
        _ => 1,
    }
}

impl QueryProcessor<'_> {
    /// Viable next nodes from `current` with their turn
    fn queue_candidates(&self, current: NodeId, direction: QueueDirection) -> Vec<(NodeId, TurnDirection)> {
        let map = self.map();
        let raw: Vec<(NodeId, TurnDirection, u32)> = match direction {
            QueueDirection::Backward => map
                .node_lookup(current)
                .map(|n| {
                    n.connections
                        .iter()
                        .map(|c| (c.from, c.turn, c.vehicle_restrictions))
                        .collect()
                })
                .unwrap_or_default(),
            QueueDirection::Forward => map
                .outgoing(current)
                .iter()
                .map(|(to, c)| (*to, c.turn, c.vehicle_restrictions))
                .collect(),
        };
        raw.into_iter()
            .filter(|&(node, _, restrictions)| {
                if restrictions & vehicle::PASSENGER_CAR == 0 || node.item() == current.item() {
                    return false;
                }
                map.node_lookup(node).is_some_and(|n| {
                    !matches!(
                        n.entry_restriction,
                        EntryRestriction::NoEntry | EntryRestriction::NoWay
                    )
                })
            })
            .map(|(node, turn, _)| (node, turn))
            .collect()
    }

    /// Foreign map owning the map edge the walk reaches at `current`
    fn queue_exit_map(&self, current: NodeId, direction: QueueDirection) -> Option<u32> {
        let segment = self.map().boundary()?.get_boundary_segment(current.item())?;
        // backward walks leave through the node's own entry, forward walks
        // through the entry of the opposite direction
        let node1 = match direction {
            QueueDirection::Backward => current.is_node1(),
            QueueDirection::Forward => !current.is_node1(),
        };
        segment.owner_map(node1)
    }

    /// Walks from `request.start` picking the best-scoring connection at each
    /// step until `target_distance_m` is covered.
    ///
    /// Every item on the path counts in full, the start item included; the
    /// reached offset is measured from the queue head. A tie for the best
    /// score is a dead end.
    pub fn queue_start(&self, request: &QueueStartRequest) -> QueueStartReply {
        let map = self.map();
        let mut reply = QueueStartReply {
            status: ReplyStatus::Ok,
            outcome: QueueOutcome::Failed,
            distance_m: 0.0,
            path: vec![request.start],
        };
        if !request.target_distance_m.is_finite() || request.target_distance_m < 0.0 {
            reply.status = ReplyStatus::NotOk;
            return reply;
        }
        if map.node_lookup(request.start).is_none() {
            reply.status = ReplyStatus::NotFound;
            return reply;
        }

        let mut current = request.start;
        let mut roundabout_entries = 0u32;
        for _ in 0..MAX_STEPS {
            let len = map.item_lookup(current.item()).map_or(0.0, |i| i.length_m());
            let remain = request.target_distance_m - reply.distance_m;
            if len >= remain {
                let fraction = if len > 0.0 { remain / len } else { 0.0 };
                let ahead = match request.direction {
                    QueueDirection::Backward => !current.is_node1(),
                    QueueDirection::Forward => current.is_node1(),
                };
                let fraction = if ahead { 1.0 - fraction } else { fraction };
                reply.distance_m = request.target_distance_m;
                reply.outcome = QueueOutcome::Reached {
                    node: current,
                    offset: to_offset(fraction),
                };
                return reply;
            }
            reply.distance_m += len;

            if let Some(map_id) = self.queue_exit_map(current, request.direction) {
                debug!(node_id = %current, map_id, "queue continues on another map");
                reply.outcome = QueueOutcome::ContinueOnMap {
                    map_id,
                    node: current,
                };
                return reply;
            }

            let candidates = self.queue_candidates(current, request.direction);
            let Some(best) = candidates.iter().map(|&(_, t)| turn_score(t)).max() else {
                reply.outcome = QueueOutcome::DeadEnd { node: current };
                return reply;
            };
            let mut top = candidates.iter().filter(|&&(_, t)| turn_score(t) == best);
            let (Some(&(next, turn)), None) = (top.next(), top.next()) else {
                debug!(node_id = %current, score = best, "ambiguous continuation");
                reply.outcome = QueueOutcome::DeadEnd { node: current };
                return reply;
            };

            let on_roundabout = map
                .item_lookup(next.item())
                .and_then(|i| i.as_routeable())
                .is_some_and(|r| r.is_roundabout());
            if on_roundabout || turn.is_roundabout() {
                roundabout_entries += 1;
                if roundabout_entries > self.config().max_roundabout_entries {
                    debug!(node_id = %next, roundabout_entries, "roundabout counter exceeded");
                    reply.status = ReplyStatus::NotOk;
                    reply.outcome = QueueOutcome::Failed;
                    return reply;
                }
            } else {
                roundabout_entries = 0;
            }
            trace!(from = %current, to = %next, ?turn, "queue step");
            reply.path.push(next);
            current = next;
        }

        debug!(start = %request.start, "queue walk hit the step limit");
        reply.status = ReplyStatus::NotOk;
        reply
    }
}
