//! Process-wide registries of grid lists that opened successfully.
//!
//! An operation whose grid list is already registered postpones opening it
//! until the first point, since the list is known to be loadable. Each
//! operation kind keeps its own registry.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Operation kinds with a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Horizontal,
    Vertical,
    Generic,
}

static HORIZONTAL: Mutex<Option<HashSet<String>>> = Mutex::new(None);
static VERTICAL: Mutex<Option<HashSet<String>>> = Mutex::new(None);
static GENERIC: Mutex<Option<HashSet<String>>> = Mutex::new(None);

fn registry(kind: RegistryKind) -> MutexGuard<'static, Option<HashSet<String>>> {
    let lock = match kind {
        RegistryKind::Horizontal => &HORIZONTAL,
        RegistryKind::Vertical => &VERTICAL,
        RegistryKind::Generic => &GENERIC,
    };
    // The sets hold plain names, so a poisoned lock is still consistent
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whether `grids` opened successfully before for this operation kind.
pub fn is_known(kind: RegistryKind, grids: &str) -> bool {
    registry(kind)
        .as_ref()
        .is_some_and(|set| set.contains(grids))
}

pub fn insert(kind: RegistryKind, grids: &str) {
    registry(kind)
        .get_or_insert_with(HashSet::new)
        .insert(grids.to_string());
}

/// Forget every list registered for `kind`.
pub fn clear(kind: RegistryKind) {
    *registry(kind) = None;
}

pub fn clear_hgridshift_known_grids() {
    clear(RegistryKind::Horizontal);
}

pub fn clear_vgridshift_known_grids() {
    clear(RegistryKind::Vertical);
}

pub fn clear_gridshift_known_grids() {
    clear(RegistryKind::Generic);
}
