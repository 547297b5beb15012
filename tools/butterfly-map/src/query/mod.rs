//! Query layer: typed requests in, typed replies out
//!
//! Each operation borrows a loaded map and the query tunables, runs the
//! composed map primitives, and reports its outcome through a
//! [`ReplyStatus`]. Internal primitives signal absence with `Option`; the
//! translation to status codes happens here and nowhere below.

pub mod expand;
pub mod item_info;
pub mod position;
pub mod queue;
pub mod route_items;

use butterfly_common::ReplyStatus;

use crate::config::QueryConfig;
use crate::map::MapAggregate;

pub use expand::{BestMatchReply, ExpandReply};
pub use item_info::{ItemInfo, ItemInfoReply, ItemInfoRequest};
pub use position::{HouseNumberReply, PositionReply, PositionRequest, Regions};
pub use queue::{QueueDirection, QueueOutcome, QueueStartReply, QueueStartRequest};
pub use route_items::{RouteItem, RouteItemsReply};

/// Stateless request handler bound to one map snapshot
#[derive(Clone, Copy)]
pub struct QueryProcessor<'a> {
    map: &'a MapAggregate,
    config: &'a QueryConfig,
}

impl<'a> QueryProcessor<'a> {
    pub fn new(map: &'a MapAggregate, config: &'a QueryConfig) -> Self {
        Self { map, config }
    }

    pub fn map(&self) -> &'a MapAggregate {
        self.map
    }

    pub fn config(&self) -> &'a QueryConfig {
        self.config
    }
}

/// Status plus payload, the shape shared by every reply
pub trait Reply {
    fn status(&self) -> ReplyStatus;
}

macro_rules! impl_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl Reply for $ty {
            fn status(&self) -> ReplyStatus {
                self.status
            }
        })*
    };
}

impl_reply!(
    PositionReply,
    HouseNumberReply,
    ExpandReply,
    BestMatchReply,
    RouteItemsReply,
    ItemInfoReply,
    QueueStartReply,
);
