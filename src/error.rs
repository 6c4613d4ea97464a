use thiserror::Error;

use crate::coord::LonLat;

/// I/O errors that can occur when reading grid resources
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The resource could not be located on any search path
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource exists but could not be opened
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// A read or seek on an open resource failed
    #[error("Read error on {resource}: {message}")]
    Read { resource: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(u16),

    /// Unsupported predictor
    #[error("Unsupported predictor: {0}")]
    UnsupportedPredictor(u16),

    /// Sample layout that grids never use (e.g. 8-bit or complex samples)
    #[error("Unsupported sample layout: {bits} bits, sample format {format}")]
    UnsupportedSampleFormat { bits: u16, format: u16 },

    /// Tile or strip could not be decompressed
    #[error("Block decode failed: {0}")]
    Decode(String),

    /// Georeferencing tags are absent or inconsistent
    #[error("Invalid georeferencing: {0}")]
    InvalidGeoreferencing(String),

    /// GDAL_METADATA could not be parsed
    #[error("Invalid GDAL metadata: {0}")]
    InvalidMetadata(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while opening grids or applying grid shifts
#[derive(Debug, Clone, Error)]
pub enum GridError {
    /// I/O error while reading a grid resource
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure error in a GeoTIFF grid
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// The resource was readable but its content is not a valid grid
    #[error("Failed to load grid {name}: {reason}")]
    FailedToLoadGrid { name: String, reason: String },

    /// No reader recognizes the resource
    #[error("Unrecognized grid format: {0}")]
    UnrecognizedFormat(String),

    /// No grid of the list covers the point
    #[error("Point outside of grid area")]
    GridArea,

    /// The point left the grid while interpolating
    #[error("Point outside of grid")]
    OutsideGrid,

    /// Inverse iteration ran out of steps; `best` is the last estimate
    #[error("Inverse grid shift failed to converge")]
    NoConvergence { best: LonLat },

    /// A sample could not be read or decoded during a query
    #[error("Sample ({x}, {y}) unavailable in grid {grid}: {reason}")]
    SampleUnavailable {
        grid: String,
        x: u32,
        y: u32,
        reason: String,
    },

    /// Operation parameter or grid metadata is not usable
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

impl GridError {
    /// Build a load failure for `name`.
    pub fn load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GridError::FailedToLoadGrid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure only means the resource does not exist.
    ///
    /// Such failures are recoverable: callers may probe other names.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GridError::Io(IoError::NotFound(_))
                | GridError::Tiff(TiffError::Io(IoError::NotFound(_)))
        )
    }

    /// Symbolic code recorded on a [`Context`](crate::Context), if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            _ if self.is_not_found() => None,
            GridError::Io(_)
            | GridError::Tiff(_)
            | GridError::FailedToLoadGrid { .. }
            | GridError::UnrecognizedFormat(_) => Some(ErrorCode::FailedToLoadGrid),
            GridError::GridArea | GridError::SampleUnavailable { .. } => {
                Some(ErrorCode::GridArea)
            }
            GridError::OutsideGrid => Some(ErrorCode::OutsideGrid),
            GridError::NoConvergence { .. } => Some(ErrorCode::NoConvergence),
            GridError::InvalidParameter { .. } => Some(ErrorCode::InvalidParameter),
        }
    }
}

/// Error state recorded on a context for batch-oriented callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required grid could not be loaded
    FailedToLoadGrid,
    /// The point is not covered by any grid
    GridArea,
    /// Interpolation stepped outside the grid
    OutsideGrid,
    /// Inverse shift did not converge
    NoConvergence,
    /// An operation parameter was rejected
    InvalidParameter,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FailedToLoadGrid => "failed to load grid",
            ErrorCode::GridArea => "point outside of grid area",
            ErrorCode::OutsideGrid => "point outside of grid",
            ErrorCode::NoConvergence => "no convergence",
            ErrorCode::InvalidParameter => "invalid parameter",
        }
    }
}
