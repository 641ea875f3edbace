//! Mapping references back to locations.
//!
//! Going from a Location to a Reference is a cheap walk down from the root
//! resource.  The other direction is inherently a scan of everything the
//! universe can reach, so the result is cached in a reverse index that
//! lives as long as a [`KeepLocationCache`] scope is active.  While the
//! scope is alive, resource data must not be mutated.

use crate::error::{Error, Result};
use crate::location::Location;
use crate::print::PrintOptions;
use crate::reference::Reference;
use crate::resource::{loaded_resources, Resource};
use crate::serialize::{item_to_string, recursive_scan};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

thread_local! {
    static LOCATION_CACHE: RefCell<HashMap<Reference, Location>> =
        RefCell::new(HashMap::new());
    static KEEP_COUNT: Cell<u32> = const { Cell::new(0) };
}

/// While any of these is alive, the reference-to-location index built by
/// [`reference_to_location`] is kept instead of being rebuilt every query.
/// Mutating resource data while the cache is alive would corrupt it, so
/// don't.
pub struct KeepLocationCache(());

impl KeepLocationCache {
    pub fn new() -> KeepLocationCache {
        KEEP_COUNT.with(|c| c.set(c.get() + 1));
        KeepLocationCache(())
    }
}

impl Default for KeepLocationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeepLocationCache {
    fn drop(&mut self) {
        KEEP_COUNT.with(|c| {
            c.set(c.get() - 1);
            if c.get() == 0 {
                LOCATION_CACHE.with(|m| m.borrow_mut().clear());
            }
        });
    }
}

/// Resolve a location to a reference, walking down from the root
/// resource's value.  Loads the root resource if it isn't loaded.
pub fn reference_from_location(loc: &Location) -> Result<Reference> {
    if loc.is_empty() {
        return Ok(Reference::empty());
    }
    if let Some(e) = loc.error() {
        return Err(e.clone());
    }
    if let Some(parent) = loc.parent() {
        let parent_ref = reference_from_location(parent)?;
        if let Some(key) = loc.key() {
            parent_ref.attr(key)
        } else {
            parent_ref.elem(loc.index().expect("key or index segment"))
        }
    } else if let Some(res) = loc.resource() {
        res.reference()
    } else {
        unreachable!("location with no parent is a root")
    }
}

/// Find the location of a reference by scanning the universe.  The scan's
/// result is cached for the duration of the innermost enclosing
/// [`KeepLocationCache`] scope (one is opened internally per query
/// otherwise).
pub fn reference_to_location(r: &Reference) -> Result<Location> {
    let _keep = KeepLocationCache::new();
    let empty = LOCATION_CACHE.with(|m| m.borrow().is_empty());
    if empty {
        recursive_scan_universe(&mut |item, loc| {
            LOCATION_CACHE.with(|m| {
                m.borrow_mut().insert(item.clone(), loc.clone())
            });
            Ok(())
        })?;
    }
    LOCATION_CACHE
        .with(|m| m.borrow().get(r).cloned())
        .ok_or_else(|| Error::UnresolvedReference {
            type_name: r.type_of().name().to_owned(),
        })
}

/// Render a reference's location for an error message, degrading to a
/// description of the failure if it can't be resolved.
pub fn show_reference(r: &Reference) -> String {
    match reference_to_location(r) {
        Ok(loc) => match item_to_string(
            &Reference::to(&loc),
            PrintOptions::compact(),
        ) {
            Ok(s) => s,
            Err(e) => format!("(error showing reference: {})", e),
        },
        Err(e) => format!("(error showing reference: {})", e),
    }
}

/// Scan every sub-item of every loaded resource.
pub(crate) fn recursive_scan_universe(
    cb: &mut dyn FnMut(&Reference, &Location) -> Result<()>,
) -> Result<()> {
    for res in loaded_resources() {
        recursive_scan_resource(&res, cb)?;
    }
    Ok(())
}

/// Scan every sub-item of one resource.  Does nothing if it is unloaded.
pub(crate) fn recursive_scan_resource(
    res: &Resource,
    cb: &mut dyn FnMut(&Reference, &Location) -> Result<()>,
) -> Result<()> {
    let Some(value) = res.get_reference() else {
        return Ok(());
    };
    recursive_scan(&value, &Location::root(res.clone()), cb)
}
