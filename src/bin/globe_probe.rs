//! Globe probe - runs the streaming engine headless against a local map.
//!
//! Usage: cargo run --release --bin globe_probe -- --config <PATH> [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Map configuration JSON (required)
//!   --options <PATH>    Engine options JSON (default: built-in defaults)
//!   --ticks <N>         Frames to run (default: 100)
//!   --eye <X,Y,Z>       Camera position in the physical SRS
//!   --target <X,Y,Z>    Camera target (default: origin)
//!   --radius <R>        Sphere radius for geographic node SRS (default: 6378137)
//!   --interval <MS>     Sleep between frames (default: 16)
//!   --debug             Serve the debug protocol and keep running

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use glam::DVec3;

use globestream::core::Camera;
use globestream::math::{CoordinateConvertor, IdentityConvertor, SphericalConvertor};
use globestream::streaming::{BasicDecoder, LocalFetcher};
use globestream::{Map, MapConfig, MapOptions};
use globestream_debug::{DebugCommand, DebugHandler, DebugResponse, ResourceInfo, ResponseData};

type BoxError = Box<dyn std::error::Error>;

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_u64_arg(args: &[String], name: &str) -> Option<u64> {
    parse_str_arg(args, name).and_then(|v| v.parse().ok())
}

fn parse_vec_arg(args: &[String], name: &str) -> Option<DVec3> {
    let value = parse_str_arg(args, name)?;
    let parts: Vec<f64> = value.split(',').map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
    match parts[..] {
        [x, y, z] => Some(DVec3::new(x, y, z)),
        _ => None,
    }
}

/// Pick a convertor for the configuration's SRS pair
fn convertor_for(config: &MapConfig, radius: f64) -> Arc<dyn CoordinateConvertor> {
    let frame = &config.reference_frame;
    if frame.node_srs == frame.physical_srs {
        Arc::new(IdentityConvertor)
    } else {
        Arc::new(SphericalConvertor::new(radius, frame.node_srs.clone(), frame.physical_srs.clone()))
    }
}

/// Default eye: above the division box, looking at its centre
fn default_eye(config: &MapConfig) -> DVec3 {
    let division = config.reference_frame.division_aabb();
    division.center() + DVec3::Z * division.size().max_element() * 1.5
}

struct ProbeDebugHandler {
    map: Arc<StdMutex<Map>>,
}

impl ProbeDebugHandler {
    fn with_map<F: FnOnce(&mut Map) -> DebugResponse>(&self, f: F) -> DebugResponse {
        match self.map.lock() {
            Ok(mut map) => f(&mut map),
            Err(_) => DebugResponse::error("engine state poisoned"),
        }
    }
}

impl DebugHandler for ProbeDebugHandler {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
        match cmd {
            DebugCommand::Ping => DebugResponse::pong(),

            DebugCommand::GetStatistics => self.with_map(|map| match serde_json::to_value(map.statistics()) {
                Ok(statistics) => DebugResponse::ok(ResponseData::Statistics { statistics }),
                Err(e) => DebugResponse::error(e.to_string()),
            }),

            DebugCommand::GetOptions => self.with_map(|map| match serde_json::to_value(map.options()) {
                Ok(options) => DebugResponse::ok(ResponseData::Options { options }),
                Err(e) => DebugResponse::error(e.to_string()),
            }),

            DebugCommand::SetOptions { options } => self.with_map(|map| {
                // Merge the given fields over the current options
                let merged = serde_json::to_value(map.options()).map(|mut current| {
                    if let (Some(current), Some(update)) = (current.as_object_mut(), options.as_object()) {
                        for (key, value) in update {
                            current.insert(key.clone(), value.clone());
                        }
                    }
                    current
                });
                match merged.and_then(serde_json::from_value::<MapOptions>) {
                    Ok(updated) => {
                        map.set_options(updated);
                        DebugResponse::ok(ResponseData::ParamsUpdated {
                            description: "options updated".into(),
                        })
                    }
                    Err(e) => DebugResponse::error(format!("invalid options: {}", e)),
                }
            }),

            DebugCommand::GetResource { name } => self.with_map(|map| {
                let blacklisted = map.cache().blacklist().contains(&name);
                match map.resource(&name) {
                    Some(resource) => DebugResponse::ok(ResponseData::Resource(ResourceInfo {
                        name: resource.name().to_string(),
                        kind: resource.kind().as_str().to_string(),
                        state: format!("{:?}", resource.state()),
                        priority: resource.priority(),
                        ram_cost: resource.ram_cost(),
                        gpu_cost: resource.gpu_cost(),
                        last_access_tick: resource.last_access_tick(),
                        blacklisted,
                    })),
                    None => DebugResponse::error(format!("no resource named '{}'", name)),
                }
            }),

            DebugCommand::PurgeViewCache => self.with_map(|map| {
                map.purge_view_cache();
                DebugResponse::none()
            }),
        }
    }
}

fn start_debug_server(map: Arc<StdMutex<Map>>) -> Result<(), BoxError> {
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    std::thread::spawn(move || {
        rt.block_on(async {
            let handler = Arc::new(tokio::sync::Mutex::new(ProbeDebugHandler { map }));
            let _server = globestream_debug::DebugServer::start(handler, globestream_debug::DEFAULT_PORT);
            log::info!("Debug server started on port {}", globestream_debug::DEFAULT_PORT);
            // Keep runtime alive forever
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
    });
    Ok(())
}

fn main() -> Result<(), BoxError> {
    globestream::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(config_path) = parse_str_arg(&args, "--config") else {
        eprintln!("usage: globe_probe --config <PATH> [--options <PATH>] [--ticks N] [--eye X,Y,Z] [--debug]");
        std::process::exit(2);
    };
    let options = match parse_str_arg(&args, "--options") {
        Some(path) => MapOptions::load(&PathBuf::from(path))?,
        None => MapOptions::default(),
    };
    let ticks = parse_u64_arg(&args, "--ticks").unwrap_or(100);
    let interval = Duration::from_millis(parse_u64_arg(&args, "--interval").unwrap_or(16));
    let radius = parse_str_arg(&args, "--radius")
        .and_then(|v| v.parse().ok())
        .unwrap_or(6_378_137.0);
    let debug = args.iter().any(|a| a == "--debug");

    // Peek at the configuration for the SRS pair and a sensible camera
    let config = MapConfig::from_json(&std::fs::read(&config_path)?, &config_path)?;
    let eye = parse_vec_arg(&args, "--eye").unwrap_or_else(|| default_eye(&config));
    let target = parse_vec_arg(&args, "--target").unwrap_or(DVec3::ZERO);
    let up = if eye.cross(DVec3::Z).length_squared() > 0.0 { DVec3::Z } else { DVec3::Y };
    let camera = Camera::look_at(eye, target, up);

    println!("=== Globestream Probe ===");
    println!("Config: {}", config_path);
    println!("Eye:    {:?}", eye);
    println!("Target: {:?}", target);
    println!("Ticks:  {}", if debug { "until interrupted".to_string() } else { ticks.to_string() });
    println!();

    let mut map = Map::new(
        options,
        Arc::new(LocalFetcher),
        Arc::new(BasicDecoder),
        convertor_for(&config, radius),
    )?;
    map.set_map_config_path(config_path);
    let map = Arc::new(StdMutex::new(map));

    if debug {
        start_debug_server(map.clone())?;
    }

    let mut tick = 0u64;
    while debug || tick < ticks {
        {
            let mut map = map.lock().map_err(|_| "engine state poisoned")?;
            map.render_tick(&camera)?;
            if tick % 20 == 0 {
                let stats = map.statistics();
                log::info!(
                    "tick {}: {} nodes, {} rendered, {} resources, {} downloading",
                    tick,
                    stats.current_nodes,
                    stats.nodes_rendered_total,
                    stats.resources.current_resources,
                    stats.resources.current_downloads
                );
            }
        }
        tick += 1;
        std::thread::sleep(interval);
    }

    let map = map.lock().map_err(|_| "engine state poisoned")?;
    println!("{}", map.statistics().to_json()?);
    for credit in map.credits() {
        println!("Credit: {} ({} nodes, lod {}) {}", credit.name, credit.hits, credit.max_lod, credit.notice);
    }
    Ok(())
}
