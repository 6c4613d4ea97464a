//! Command-line configuration for the `gridshift` binary.
//!
//! Options can also be set through environment variables with the
//! `GRIDSHIFT_` prefix:
//!
//! - `GRIDSHIFT_PATH` - Grid search directories (comma-separated)
//! - `GRIDSHIFT_CACHE_BLOCKS` - Decoded blocks cached per GeoTIFF resource (default: 64)
//!
//! # Example
//!
//! ```ignore
//! use gridshift::config::Cli;
//!
//! let cli = Cli::parse();
//! let ctx = cli.context();
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::context::Context;
use crate::coord::{Coordinate, Direction};
use crate::error::GridError;
use crate::shift::{parse_t_final, Interpolation, TimeBracket};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of decoded blocks cached per GeoTIFF resource.
pub const DEFAULT_CACHE_BLOCKS: usize = crate::io::DEFAULT_BLOCK_CACHE_CAPACITY;

/// Upper bound for `--cache-blocks`.
pub const MAX_CACHE_BLOCKS: usize = 1 << 20;

/// Time of points given without one: outside any time bracket.
pub const DEFAULT_POINT_TIME: f64 = f64::INFINITY;

// =============================================================================
// CLI Arguments
// =============================================================================

/// gridshift - Apply datum-shift grids to coordinates.
///
/// Reads NTv1, CTable2, NTv2, GTX and GeoTIFF grids and applies
/// horizontal, vertical and generic corrections.
#[derive(Parser, Debug, Clone)]
#[command(name = "gridshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories searched for relative grid names (comma-separated).
    #[arg(long, env = "GRIDSHIFT_PATH", value_delimiter = ',', global = true)]
    pub grid_path: Vec<PathBuf>,

    /// Decoded blocks cached per GeoTIFF resource.
    #[arg(
        long,
        default_value_t = DEFAULT_CACHE_BLOCKS,
        env = "GRIDSHIFT_CACHE_BLOCKS",
        global = true
    )]
    pub cache_blocks: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Describe a grid file: format, grids and hierarchy.
    Info(InfoConfig),

    /// Horizontal shift through NTv1, CTable2, NTv2 or GeoTIFF grids.
    Hgrid(ShiftConfig),

    /// Vertical shift through GTX or GeoTIFF grids.
    Vgrid(ShiftConfig),

    /// Metadata-driven shift through GeoTIFF grids.
    Gridshift(ShiftConfig),
}

/// Grid kind to open a file as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Pick from the detected format
    #[default]
    Auto,
    Horizontal,
    Vertical,
    Generic,
}

/// Output format of reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per item
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Arguments of the `info` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Grid file name.
    pub grid: String,

    /// Kind of grid to open the file as.
    #[arg(long, value_enum, default_value_t = KindArg::Auto)]
    pub kind: KindArg,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments shared by the shift subcommands.
#[derive(Args, Debug, Clone)]
pub struct ShiftConfig {
    /// Grid list, comma-separated; `@name` marks an optional grid.
    #[arg(long)]
    pub grids: String,

    /// Point as `lon,lat[,z[,t]]`, degrees. Repeatable; stdin is read
    /// when absent.
    #[arg(long = "point", allow_hyphen_values = true)]
    pub points: Vec<String>,

    /// Apply the inverse shift.
    #[arg(long, default_value_t = false)]
    pub inverse: bool,

    /// Epoch of the time bracket, decimal year.
    #[arg(long)]
    pub t_epoch: Option<f64>,

    /// Target time of the time bracket: decimal year or `now`.
    #[arg(long)]
    pub t_final: Option<String>,

    /// Vertical multiplier (`vgrid` only).
    #[arg(long, allow_hyphen_values = true)]
    pub multiplier: Option<f64>,

    /// Interpolation method (`gridshift` only): bilinear or biquadratic.
    #[arg(long)]
    pub interpolation: Option<String>,

    /// Open grids on the first point instead of up front.
    #[arg(long, default_value_t = false)]
    pub defer: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.cache_blocks > MAX_CACHE_BLOCKS {
            return Err(format!("cache_blocks must be at most {}", MAX_CACHE_BLOCKS));
        }
        match &self.command {
            Command::Info(info) if info.grid.is_empty() => Err("grid name is required".to_string()),
            Command::Info(_) => Ok(()),
            Command::Hgrid(shift) => shift.validate("hgrid"),
            Command::Vgrid(shift) => shift.validate("vgrid"),
            Command::Gridshift(shift) => shift.validate("gridshift"),
        }
    }

    /// Context holding the search paths and cache sizing of this invocation.
    pub fn context(&self) -> Context {
        Context::new()
            .with_search_paths(self.grid_path.iter().cloned())
            .with_block_cache_capacity(self.cache_blocks)
    }
}

impl ShiftConfig {
    fn validate(&self, command: &str) -> Result<(), String> {
        if self.grids.trim().is_empty() {
            return Err("--grids must name at least one grid".to_string());
        }
        if self.multiplier.is_some() && command != "vgrid" {
            return Err(format!("--multiplier is not supported by {}", command));
        }
        if self.interpolation.is_some() && command != "gridshift" {
            return Err(format!("--interpolation is not supported by {}", command));
        }
        if (self.t_epoch.is_some() || self.t_final.is_some()) && command == "gridshift" {
            return Err("gridshift does not take a time bracket".to_string());
        }
        if let Some(method) = &self.interpolation {
            method.parse::<Interpolation>().map_err(|e| e.to_string())?;
        }
        if let Some(t_final) = &self.t_final {
            parse_t_final(t_final).map_err(|e| e.to_string())?;
        }
        for point in &self.points {
            parse_point(point)?;
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        if self.inverse {
            Direction::Inverse
        } else {
            Direction::Forward
        }
    }

    /// Time bracket from `--t-epoch` and `--t-final`; unset values are 0.
    pub fn time_bracket(&self) -> Result<TimeBracket, GridError> {
        let t_final = match &self.t_final {
            Some(value) => parse_t_final(value)?,
            None => 0.0,
        };
        Ok(TimeBracket::new(self.t_epoch.unwrap_or(0.0), t_final))
    }

    pub fn interpolation(&self) -> Result<Option<Interpolation>, GridError> {
        self.interpolation.as_deref().map(str::parse).transpose()
    }
}

/// Parse `lon,lat[,z[,t]]` in degrees.
///
/// Whitespace may separate the values too. A missing height is 0 and a
/// missing time is [`DEFAULT_POINT_TIME`].
pub fn parse_point(text: &str) -> Result<Coordinate, String> {
    let values = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| format!("invalid number {:?} in point {:?}", s, text))
        })
        .collect::<Result<Vec<f64>, String>>()?;

    match values.as_slice() {
        [lon, lat] => Ok(Coordinate::from_degrees(*lon, *lat, 0.0, DEFAULT_POINT_TIME)),
        [lon, lat, z] => Ok(Coordinate::from_degrees(*lon, *lat, *z, DEFAULT_POINT_TIME)),
        [lon, lat, z, t] => Ok(Coordinate::from_degrees(*lon, *lat, *z, *t)),
        _ => Err(format!(
            "expected lon,lat[,z[,t]], got {} value(s) in {:?}",
            values.len(),
            text
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
