use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use butterfly_map::export::server;
use butterfly_map::geo::Coord;
use butterfly_map::item::NBR_ZOOM_LEVELS;
use butterfly_map::map::OMNIDIRECTIONAL;
use butterfly_map::query::PositionRequest;
use butterfly_map::{
    GraphExport, ItemType, ItemTypeSet, MapFile, MapHandler, QueryProcessor, ServerConfig,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "butterfly-map")]
#[command(about = "In-memory map server: spatial queries and routing graph export", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show item counts and header fields of a map
    Info {
        map_id: u32,
        /// Directory holding the map files
        #[arg(long, default_value = ".")]
        map_dir: PathBuf,
    },
    /// Find the item nearest to a coordinate
    Nearest {
        map_id: u32,
        #[arg(long, default_value = ".")]
        map_dir: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Travel heading in degrees; omit for any direction
        #[arg(long)]
        heading: Option<i32>,
        /// Comma-separated item types (e.g. streetSegment,poi); all when omitted
        #[arg(long)]
        types: Option<String>,
    },
    /// Write the routing graph export of a map to a file
    Export {
        map_id: u32,
        #[arg(long, default_value = ".")]
        map_dir: PathBuf,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Serve graph exports over TCP
    Serve {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides the configuration
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_types(types: Option<&str>) -> Result<ItemTypeSet> {
    let Some(types) = types else {
        return Ok(ItemTypeSet::all());
    };
    let mut set = ItemTypeSet::empty();
    for name in types.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let t = ItemType::from_name(name).with_context(|| format!("Unknown item type '{name}'"))?;
        set.insert(t);
    }
    Ok(set)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Info { map_id, map_dir } => {
            let path = MapFile::path_for(&map_dir, map_id);
            let summary = MapFile::verify(&path)
                .with_context(|| format!("Failed to verify {}", path.display()))?;
            let map = MapHandler::new(&map_dir).load(map_id)?;

            println!("Map {:09} ({})", map_id, path.display());
            println!("  level:      {}", summary.level);
            println!("  version:    {}", summary.version);
            println!("  size:       {} bytes", summary.size);
            println!("  crc64:      0x{:016x}", summary.crc);
            println!("  items:      {}", map.items().total_items());
            for zoom in 0..NBR_ZOOM_LEVELS as u8 {
                let n = map.nbr_items_with_zoom(zoom);
                if n > 0 {
                    println!("    zoom {:>2}: {}", zoom, n);
                }
            }
            println!("  strings:    {}", map.strings().len());
            println!("  connections: {}", map.graph().connection_count());
            match map.boundary() {
                Some(b) => println!(
                    "  boundary:   {} segments, {} external connections",
                    b.len(),
                    b.external_connection_count()
                ),
                None => println!("  boundary:   none (country map)"),
            }
            println!("  overviews:  {:?}", map.overview_maps());
            println!("  multi-connections: {}", map.expansion().len());
        }
        Commands::Nearest {
            map_id,
            map_dir,
            lat,
            lon,
            heading,
            types,
        } => {
            let config = ServerConfig::default();
            let map = MapHandler::new(&map_dir).load(map_id)?;
            let request = PositionRequest {
                coord: Coord::from_degrees(lat, lon),
                heading: heading.unwrap_or(OMNIDIRECTIONAL),
                allowed: parse_types(types.as_deref())?,
            };
            let start = Instant::now();
            let reply = QueryProcessor::new(&map, &config.query).nearest_item(&request);
            let elapsed = start.elapsed();

            println!("status:   {:?}", reply.status);
            if let Some(item_id) = reply.item_id {
                let item = map.item_lookup(item_id);
                println!("item:     {} ({:?})", item_id, item.map(|i| i.item_type()));
                if let Some(name) = item.and_then(|i| map.best_name(i)) {
                    println!("name:     {}", name);
                }
                println!("offset:   {}", reply.offset);
                println!("distance: {:.1} m", reply.squared_distance.sqrt());
                if let Some(node) = reply.node {
                    println!("node:     {}", node);
                }
                println!("regions:  {:?}", reply.regions);
            }
            println!("time:     {:.2?}", elapsed);
        }
        Commands::Export {
            map_id,
            map_dir,
            out,
        } => {
            let map = MapHandler::new(&map_dir).load(map_id)?;
            let file =
                File::create(&out).with_context(|| format!("Failed to create {}", out.display()))?;
            let mut writer = BufWriter::new(file);
            let summary = GraphExport::new(&map).run(&mut writer)?;
            println!(
                "Exported map {:09}: {} nodes, {} connections, {} external nodes, {} bytes -> {}",
                map_id,
                summary.nodes,
                summary.connections,
                summary.external_nodes,
                summary.bytes,
                out.display()
            );
        }
        Commands::Serve { config, bind } => {
            let mut config = match config {
                Some(path) => ServerConfig::read(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(bind) = bind {
                config.export_bind = bind;
            }
            let handler = Arc::new(MapHandler::from_config(&config));
            for &map_id in &config.preload {
                handler
                    .load(map_id)
                    .with_context(|| format!("Failed to preload map {map_id:09}"))?;
            }
            info!(
                map_dir = %config.map_dir.display(),
                preloaded = config.preload.len(),
                "starting graph export server"
            );
            server::serve(handler, &config.export_bind).await?;
        }
    }

    Ok(())
}
