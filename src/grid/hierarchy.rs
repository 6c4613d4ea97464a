//! Reconstruction of grid hierarchies from declared names and extents.

use std::collections::HashMap;

use tracing::debug;

use super::{Grid, GridKind};

/// Builds a forest of grids while they are read from a resource.
///
/// Grids are owned by their parent; the builder keeps a separate index of
/// the path (child indices from the top level) of every named grid so
/// later grids can be attached to it.
pub struct HierarchyBuilder<S: ?Sized> {
    roots: Vec<Grid<S>>,
    paths: HashMap<String, Vec<usize>>,
    inserted: usize,
}

impl<S: ?Sized + GridKind> HierarchyBuilder<S> {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            paths: HashMap::new(),
            inserted: 0,
        }
    }

    /// Insert a grid using its declared name and parent name, falling back
    /// to extent containment.
    ///
    /// - a declared parent that exists and contains the grid adopts it
    /// - a named grid without a declared parent is top-level
    /// - otherwise the first top-level grid (of the same `TYPE`) containing
    ///   it adopts it, recursively; failing that it becomes top-level
    pub fn insert(&mut self, mut grid: Grid<S>, name: &str, parent: &str) {
        self.number(&mut grid);
        if !parent.is_empty() {
            match self.paths.get(parent).cloned() {
                None => debug!(
                    grid = %name,
                    parent = %parent,
                    "Grid refers to non-existing parent; using bounding-box method"
                ),
                Some(mut path) => match self.node_mut(&path) {
                    Some(parent_grid) if parent_grid.extent().contains(grid.extent()) => {
                        path.push(parent_grid.children().len());
                        parent_grid.children_mut().push(grid);
                        self.register(name, path);
                        return;
                    }
                    _ => debug!(
                        grid = %name,
                        parent = %parent,
                        "Grid extent is not included in its parent; using bounding-box method"
                    ),
                },
            }
        } else if !name.is_empty() {
            self.push_root(grid, name);
            return;
        }

        let grid_type = grid.type_tag().map(str::to_string);
        let target = self.roots.iter().position(|candidate| {
            if let Some(t) = grid_type.as_deref() {
                if candidate.type_tag() != Some(t) {
                    return false;
                }
            }
            if candidate.extent().contains(grid.extent()) {
                return true;
            }
            if candidate.extent().intersects(grid.extent()) {
                debug!(grid = %name, other = %candidate.name(), "Partially intersecting grids found");
            }
            false
        });

        match target {
            Some(index) => {
                let mut path = vec![index];
                insert_into(&mut self.roots[index], grid, &mut path);
                self.register(name, path);
            }
            None => self.push_root(grid, name),
        }
    }

    /// Insert a grid whose parent is known only by name.
    ///
    /// Unknown parents and the `NONE` marker make the grid top-level; the
    /// extents are not consulted.
    pub fn insert_by_name(&mut self, mut grid: Grid<S>, name: &str, parent: &str) {
        self.number(&mut grid);
        let parent_path = match parent {
            "" | "NONE" => None,
            p if p == name => None,
            p => {
                let found = self.paths.get(p).cloned();
                if found.is_none() {
                    debug!(grid = %name, parent = %p, "Parent grid not found; grid is top-level");
                }
                found
            }
        };

        let Some(mut path) = parent_path else {
            self.push_root(grid, name);
            return;
        };
        match self.node_mut(&path) {
            Some(node) => {
                path.push(node.children().len());
                node.children_mut().push(grid);
                self.register(name, path);
            }
            None => self.push_root(grid, name),
        }
    }

    /// Number of top-level grids so far.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn finish(self) -> Vec<Grid<S>> {
        self.roots
    }

    fn number(&mut self, grid: &mut Grid<S>) {
        grid.set_ordinal(self.inserted);
        self.inserted += 1;
    }

    fn push_root(&mut self, grid: Grid<S>, name: &str) {
        self.roots.push(grid);
        self.register(name, vec![self.roots.len() - 1]);
    }

    fn register(&mut self, name: &str, path: Vec<usize>) {
        if name.is_empty() {
            return;
        }
        if self.paths.insert(name.to_string(), path).is_some() {
            debug!(grid = %name, "Several grids with the same name found");
        }
    }

    fn node_mut(&mut self, path: &[usize]) -> Option<&mut Grid<S>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for index in rest {
            node = node.children_mut().get_mut(*index)?;
        }
        Some(node)
    }
}

impl<S: ?Sized + GridKind> Default for HierarchyBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach `grid` below `parent`, descending into the first containing
/// child at each level. `path` is extended with the indices taken.
fn insert_into<S: ?Sized + GridKind>(parent: &mut Grid<S>, grid: Grid<S>, path: &mut Vec<usize>) {
    let mut target = None;
    for (index, child) in parent.children().iter().enumerate() {
        if child.extent().contains(grid.extent()) {
            target = Some(index);
            break;
        }
        if child.extent().intersects(grid.extent()) {
            debug!(grid = %grid.name(), other = %child.name(), "Partially intersecting grids found");
        }
    }

    match target {
        Some(index) => {
            path.push(index);
            insert_into(&mut parent.children_mut()[index], grid, path);
        }
        None => {
            path.push(parent.children().len());
            parent.children_mut().push(grid);
        }
    }
}
