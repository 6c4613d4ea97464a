//! Per-caller state: resource lookup, cache sizing and the sticky error code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{ErrorCode, GridError, IoError};
use crate::io::{FileRangeReader, RangeReader, DEFAULT_BLOCK_CACHE_CAPACITY};

/// An opened grid resource.
#[derive(Clone)]
pub struct Resource {
    /// Name the resource was found under (an alternative name when the
    /// requested one was replaced)
    pub name: String,
    pub reader: Arc<dyn RangeReader>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("identifier", &self.reader.identifier())
            .finish()
    }
}

/// State shared by the grid operations of one caller.
///
/// A context is meant for use from one thread at a time; operations take
/// it by `&mut` to record failures.
#[derive(Debug, Clone)]
pub struct Context {
    search_paths: Vec<PathBuf>,
    block_cache_capacity: usize,
    defer_grid_opening: bool,
    grid_alternatives: HashMap<String, String>,
    last_error: Option<ErrorCode>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            defer_grid_opening: false,
            grid_alternatives: HashMap::new(),
            last_error: None,
        }
    }

    /// Replace the directories searched for relative grid names.
    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_block_cache_capacity(mut self, capacity: usize) -> Self {
        self.block_cache_capacity = capacity;
        self
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Blocks kept per tagged-raster resource.
    pub fn block_cache_capacity(&self) -> usize {
        self.block_cache_capacity
    }

    /// When set, operations postpone opening their grids to the first
    /// point they transform.
    pub fn set_defer_grid_opening(&mut self, defer: bool) {
        self.defer_grid_opening = defer;
    }

    pub fn defer_grid_opening(&self) -> bool {
        self.defer_grid_opening
    }

    /// Register `replacement` as the name to try when `name` is not found
    /// (e.g. a legacy `.gtx` grid republished as GeoTIFF).
    pub fn add_grid_alternative(&mut self, name: impl Into<String>, replacement: impl Into<String>) {
        self.grid_alternatives.insert(name.into(), replacement.into());
    }

    pub fn grid_alternative(&self, name: &str) -> Option<&str> {
        self.grid_alternatives.get(name).map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Resource lookup
    // -------------------------------------------------------------------------

    /// Locate and open a grid resource by name.
    ///
    /// A missing resource yields [`IoError::NotFound`], which callers treat
    /// as recoverable.
    pub fn open_resource(&self, name: &str) -> Result<Resource, GridError> {
        match self.open_path(name) {
            Err(IoError::NotFound(_)) => match self.grid_alternative(name) {
                Some(alternative) => {
                    debug!(grid = %name, alternative = %alternative, "Using alternative grid name");
                    let reader = self.open_path(alternative)?;
                    Ok(Resource {
                        name: alternative.to_string(),
                        reader,
                    })
                }
                None => Err(IoError::NotFound(name.to_string()).into()),
            },
            Err(e) => Err(e.into()),
            Ok(reader) => Ok(Resource {
                name: name.to_string(),
                reader,
            }),
        }
    }

    /// Resolve a name to an existing path without opening it.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.candidates(name).into_iter().find(|p| p.is_file())
    }

    fn open_path(&self, name: &str) -> Result<Arc<dyn RangeReader>, IoError> {
        for candidate in self.candidates(name) {
            trace!(path = %candidate.display(), "Trying grid location");
            match FileRangeReader::open(&candidate) {
                Ok(reader) => {
                    debug!(grid = %name, path = %candidate.display(), "Opened grid resource");
                    return Ok(Arc::new(reader));
                }
                Err(IoError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(IoError::NotFound(name.to_string()))
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() || name.starts_with("./") || name.starts_with("../") {
            return vec![path.to_path_buf()];
        }
        let mut candidates: Vec<PathBuf> = self.search_paths.iter().map(|dir| dir.join(name)).collect();
        candidates.push(path.to_path_buf());
        candidates
    }

    // -------------------------------------------------------------------------
    // Error state
    // -------------------------------------------------------------------------

    /// Record `error` unless it is a plain resource-not-found.
    pub fn record(&mut self, error: &GridError) {
        if let Some(code) = error.code() {
            self.last_error = Some(code);
        }
    }

    pub fn set_errno(&mut self, code: ErrorCode) {
        self.last_error = Some(code);
    }

    /// Last recorded error code.
    pub fn errno(&self) -> Option<ErrorCode> {
        self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
