//! Launch parameter parsing.

use std::time::Duration;

use clap::Parser;
use tilevox::{PipelineConfig, Query, TraversalLimits, UpAxis};

/// Default query latitude (central London).
const DEFAULT_LAT: f64 = 51.5007;
/// Default query longitude (central London).
const DEFAULT_LON: f64 = -0.1246;
/// Default query radius in meters.
const DEFAULT_RADIUS: f64 = 100.0;
/// Default voxels along each payload's longest axis.
const DEFAULT_RESOLUTION: u32 = 32;
/// Default fetch cache budget in MiB.
const DEFAULT_CACHE_MB: usize = 256;

/// Everything needed to run one query.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchParams {
    pub query: Query,
    pub config: PipelineConfig,
    /// Where the encoded voxels are written.
    pub output: String,
    pub timeout: Duration,
    /// Fetch cache budget in bytes.
    pub cache_bytes: usize,
}

fn parse_up_axis(s: &str) -> Result<UpAxis, String> {
    match s.to_ascii_lowercase().as_str() {
        "y" => Ok(UpAxis::Y),
        "z" => Ok(UpAxis::Z),
        _ => Err(format!("expected 'y' or 'z', got '{s}'")),
    }
}

#[derive(Parser)]
#[command(about = "Voxelize streamed 3D tiles around a geographic point")]
struct CliArgs {
    /// Query latitude in degrees.
    #[arg(long, default_value_t = DEFAULT_LAT, allow_negative_numbers = true)]
    lat: f64,

    /// Query longitude in degrees.
    #[arg(long, default_value_t = DEFAULT_LON, allow_negative_numbers = true)]
    lon: f64,

    /// Query radius in meters.
    #[arg(long, default_value_t = DEFAULT_RADIUS)]
    radius: f64,

    /// Voxels along each payload's longest axis.
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: u32,

    /// API key for the tile service.
    #[arg(long, env = "TILEVOX_API_KEY", hide_env_values = true)]
    key: String,

    /// Output file for the encoded voxel records.
    #[arg(long, short, default_value = "voxels.bin")]
    output: String,

    /// Root tileset URL.
    #[arg(long, default_value = tilevox::DEFAULT_ROOT_URL)]
    root_url: String,

    /// Maximum tile hierarchy depth.
    #[arg(long, default_value_t = tilevox::resolver::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Maximum number of tile nodes visited.
    #[arg(long, default_value_t = tilevox::resolver::DEFAULT_MAX_NODES)]
    max_nodes: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = tilevox::DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Fetch cache budget in MiB.
    #[arg(long, default_value_t = DEFAULT_CACHE_MB)]
    cache_mb: usize,

    /// Up axis of the mesh payloads (y or z).
    #[arg(long, value_parser = parse_up_axis, default_value = "y")]
    up_axis: UpAxis,

    /// Keep only the first voxel emitted for each cell of a payload.
    #[arg(long)]
    dedup: bool,
}

impl From<CliArgs> for LaunchParams {
    fn from(args: CliArgs) -> Self {
        let limits = TraversalLimits::default()
            .with_max_depth(args.max_depth)
            .with_max_nodes(args.max_nodes);
        Self {
            query: Query::new(args.lat, args.lon, args.radius, args.resolution, args.key),
            config: PipelineConfig::default()
                .with_root_url(args.root_url)
                .with_limits(limits)
                .with_up_axis(args.up_axis)
                .with_dedup(args.dedup),
            output: args.output,
            timeout: Duration::from_secs(args.timeout_secs),
            cache_bytes: args.cache_mb.saturating_mul(1 << 20),
        }
    }
}

/// Parse launch parameters from the command line.
pub fn parse() -> LaunchParams {
    CliArgs::parse().into()
}
