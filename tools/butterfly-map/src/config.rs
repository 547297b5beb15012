//! Server configuration
//!
//! Every field has a default, so an absent or partial JSON file is valid.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::graph::CostModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `{map_id:09}.mcm` files
    pub map_dir: PathBuf,
    /// Listen address of the graph export server
    pub export_bind: String,
    /// Maps loaded at startup
    pub preload: Vec<u32>,
    pub spatial: SpatialConfig,
    pub query: QueryConfig,
    pub cost: CostModel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            map_dir: PathBuf::from("."),
            export_bind: "0.0.0.0:7100".to_string(),
            preload: Vec::new(),
            spatial: SpatialConfig::default(),
            query: QueryConfig::default(),
            cost: CostModel::default(),
        }
    }
}

impl ServerConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let config: ServerConfig = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.spatial.cell_size_deg > 0.0 && self.spatial.cell_size_deg <= 1.0,
            "spatial.cell_size_deg must be in (0, 1], got {}",
            self.spatial.cell_size_deg
        );
        anyhow::ensure!(self.spatial.max_rings > 0, "spatial.max_rings must be > 0");
        anyhow::ensure!(
            self.query.heading_search_radius_m > 0.0,
            "query.heading_search_radius_m must be > 0"
        );
        anyhow::ensure!(
            self.query.max_route_item_samples > 0,
            "query.max_route_item_samples must be > 0"
        );
        Ok(())
    }
}

/// Spatial hash grid parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Edge of one grid cell, degrees
    pub cell_size_deg: f64,
    /// Rings searched around the query cell before giving up
    pub max_rings: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: 0.005,
            max_rings: 64,
        }
    }
}

/// Tunables of the query layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Candidate radius of heading-aware nearest segment search
    pub heading_search_radius_m: f64,
    /// Weight of the squared heading mismatch (degrees²) against squared metres
    pub heading_weight: f64,
    /// Added to the score when the heading implies entering a restricted node
    pub restriction_penalty: f64,
    /// Consecutive roundabout entries before a queue walk is aborted
    pub max_roundabout_entries: u32,
    /// Geometry samples taken when expanding area items into route items
    pub max_route_item_samples: usize,
    /// Radius around each sample searched for street segments
    pub route_item_search_radius_m: f64,
    /// Radius searched for items around a point in item-info requests
    pub item_info_radius_m: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            heading_search_radius_m: 50.0,
            heading_weight: 0.1,
            restriction_penalty: 2_500.0,
            max_roundabout_entries: 9,
            max_route_item_samples: 50,
            route_item_search_radius_m: 250.0,
            item_info_radius_m: 100.0,
        }
    }
}
