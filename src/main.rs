//! gridshift - apply datum-shift grids from the command line.

use std::io::BufRead;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridshift::{
    apply_batch,
    config::{parse_point, Cli, Command, InfoConfig, KindArg, OutputFormat, ShiftConfig},
    Context, Coordinate, GenericGridSet, GenericGridShift, GridFormat, GridOperation,
    GridSetSummary, HorizontalGridSet, HorizontalGridShift, ShiftedPoint, VerticalGridSet,
    VerticalGridShift,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let ctx = cli.context();
    match &cli.command {
        Command::Info(config) => run_info(&ctx, config),
        Command::Hgrid(config) => run_shift(ctx, config, OperationKind::Horizontal),
        Command::Vgrid(config) => run_shift(ctx, config, OperationKind::Vertical),
        Command::Gridshift(config) => run_shift(ctx, config, OperationKind::Generic),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "gridshift=debug"
    } else {
        "gridshift=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(ctx: &Context, config: &InfoConfig) -> ExitCode {
    let summary = match open_summary(ctx, &config.grid, config.kind) {
        Ok(summary) => summary,
        Err(e) => {
            error!(grid = %config.grid, "Cannot open grid: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Cannot serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => {
            println!("{} ({})", summary.name, summary.format);
            for grid in &summary.grids {
                print_grid(grid, 1);
            }
        }
    }
    ExitCode::SUCCESS
}

fn print_grid(grid: &gridshift::GridSummary, depth: usize) {
    let e = &grid.extent;
    println!(
        "{:indent$}{} [{}] {}x{} W {:.6} S {:.6} E {:.6} N {:.6} res {:.8} x {:.8}{}",
        "",
        grid.name,
        grid.kind,
        grid.width,
        grid.height,
        e.west,
        e.south,
        e.east,
        e.north,
        e.res_x,
        e.res_y,
        grid.grid_type
            .as_deref()
            .map(|t| format!(" TYPE={}", t))
            .unwrap_or_default(),
        indent = depth * 2
    );
    for child in &grid.children {
        print_grid(child, depth + 1);
    }
}

/// Open `name` as the requested kind; `auto` tries each kind in turn.
fn open_summary(ctx: &Context, name: &str, kind: KindArg) -> Result<GridSetSummary, String> {
    let horizontal = || HorizontalGridSet::open(ctx, name).map(|s| s.summary());
    let vertical = || VerticalGridSet::open(ctx, name).map(|s| s.summary());
    let generic = || GenericGridSet::open(ctx, name).map(|s| s.summary());

    let result = match kind {
        KindArg::Horizontal => horizontal(),
        KindArg::Vertical => vertical(),
        KindArg::Generic => generic(),
        KindArg::Auto => horizontal()
            .or_else(|e| {
                debug!(grid = %name, error = %e, "Not a horizontal grid");
                vertical()
            })
            .or_else(|e| {
                debug!(grid = %name, error = %e, "Not a vertical grid");
                generic()
            }),
    };
    result
        .map_err(|e| e.to_string())
        .and_then(|summary| match summary.format {
            GridFormat::Null if name != "null" => Err("not a grid file".to_string()),
            _ => Ok(summary),
        })
}

// =============================================================================
// Shift Commands
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum OperationKind {
    Horizontal,
    Vertical,
    Generic,
}

fn build_operation(
    ctx: &Context,
    config: &ShiftConfig,
    kind: OperationKind,
) -> Result<Box<dyn GridOperation>, gridshift::GridError> {
    Ok(match kind {
        OperationKind::Horizontal => Box::new(HorizontalGridShift::new(
            ctx,
            &config.grids,
            config.time_bracket()?,
        )?),
        OperationKind::Vertical => Box::new(VerticalGridShift::new(
            ctx,
            &config.grids,
            config.time_bracket()?,
            config.multiplier,
        )?),
        OperationKind::Generic => Box::new(GenericGridShift::new(
            ctx,
            &config.grids,
            config.interpolation()?,
        )?),
    })
}

fn run_shift(mut ctx: Context, config: &ShiftConfig, kind: OperationKind) -> ExitCode {
    ctx.set_defer_grid_opening(config.defer);

    let mut op = match build_operation(&ctx, config, kind) {
        Ok(op) => op,
        Err(e) => {
            error!(grids = %config.grids, "Cannot set up operation: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let coords = match read_points(&config.points) {
        Ok(coords) => coords,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let results = apply_batch(op.as_mut(), &mut ctx, &coords, config.direction());
    let results: Vec<ShiftedPoint> = results.iter().map(ShiftedPoint::to_degrees).collect();

    match config.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Cannot serialize results: {}", e);
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => {
            for point in &results {
                print_point(point);
            }
        }
    }

    if results.iter().all(ShiftedPoint::is_ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_point(point: &ShiftedPoint) {
    let out = &point.output;
    match &point.message {
        None => println!("{:.10} {:.10} {:.4}", out.lon, out.lat, out.z),
        Some(message) => println!("{:.10} {:.10} {:.4} # {}", out.lon, out.lat, out.z, message),
    }
}

/// Points from `--point`, or one per stdin line when none were given.
fn read_points(points: &[String]) -> Result<Vec<Coordinate>, String> {
    if !points.is_empty() {
        return points.iter().map(|p| parse_point(p)).collect();
    }

    let stdin = std::io::stdin();
    let mut coords = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| format!("Cannot read stdin: {}", e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        coords.push(parse_point(line)?);
    }
    Ok(coords)
}
