//! butterfly-map: in-memory map server
//!
//! Loads binary map files into [`MapAggregate`]s and answers spatial and
//! graph queries against them: nearest items, item expansion, route items,
//! queue-start search. The routing graph of a map can be streamed to an
//! external routing engine as an index-based block format ([`export`]).
//!
//! Layering, bottom up:
//! - [`item`], [`graph`], [`boundary`], [`strings`]: the stores of one map
//! - [`spatial`]: grid hash for nearest/radius/bbox searches
//! - [`map`]: the aggregate composing them, plus geometry helpers
//! - [`query`]: typed requests and replies with status codes
//! - [`handler`]: registry of loaded maps
//! - [`formats`], [`export`]: on-disk map files and the graph export stream

pub mod boundary;
pub mod config;
pub mod export;
pub mod formats;
pub mod geo;
pub mod graph;
pub mod handler;
pub mod item;
pub mod map;
pub mod query;
pub mod spatial;
pub mod strings;

pub use config::ServerConfig;
pub use export::{ExportError, ExportSummary, GraphExport};
pub use formats::MapFile;
pub use handler::MapHandler;
pub use item::{Item, ItemId, ItemType, ItemTypeSet};
pub use map::MapAggregate;
pub use query::QueryProcessor;
