//! Named top-level values backed by persistent sources.
//!
//! A resource has a name (an IRI), a value (a [`Dynamic`]), and a state.
//! Resources can be loaded, saved, unloaded, and reloaded, singly or in
//! batches; the batch operations verify before they commit, so reference
//! integrity between resources survives (or the operation fails with the
//! offending locations).  Interpretation of names is delegated to
//! registered [`ResourceScheme`]s; with no schemes registered, a default
//! `file` scheme maps paths under a configurable root directory.

use crate::dynamic::Dynamic;
use crate::error::{Error, Result};
use crate::location::{resolve_iri, Location};
use crate::parse::tree_from_file;
use crate::print::{string_to_file, tree_to_string, PrintOptions};
use crate::reference::Reference;
use crate::registry::Type;
use crate::scan::recursive_scan_resource;
use crate::serialize::{item_from_tree, item_to_tree, recursive_scan};
use crate::tree::Tree;
use percent_encoding::percent_decode_str;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    /// Not loaded; the value is empty.
    Unloaded,
    /// Fully loaded with a non-empty value (which may not match the disk).
    Loaded,
    // The remaining states only occur while a resource operation is
    // ongoing.
    LoadConstructing,
    LoadRollback,
    SaveVerifying,
    SaveCommitting,
    UnloadVerifying,
    UnloadCommitting,
    ReloadConstructing,
    ReloadVerifying,
    ReloadRollback,
    ReloadCommitting,
}

pub(crate) struct ResourceData {
    name: Url,
    value: Dynamic,
    /// Holds the previous value while a reload is in flight.
    old_value: Dynamic,
    state: ResourceState,
}

/// A shared handle to a resource record.  Two Resources with the same name
/// share storage; equality is identity of that storage.
#[derive(Clone)]
pub struct Resource {
    data: Rc<RefCell<ResourceData>>,
}

impl PartialEq for Resource {
    fn eq(&self, other: &Resource) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}
impl Eq for Resource {}

impl std::hash::Hash for Resource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.data).hash(state);
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Resource({})", self.data.borrow().name)
    }
}

///// SCHEMES

/// A user-installed adapter for a URI scheme prefix: validates names, gates
/// top-level value types, and maps names to files on disk.
pub trait ResourceScheme {
    /// Extra validation beyond IRI syntax.  The provided IRI has no
    /// fragment.
    fn accepts_iri(&self, _iri: &Url) -> bool {
        true
    }

    /// Restrict the allowed top-level types of this scheme's resources.
    fn accepts_type(&self, _ty: Type) -> bool {
        true
    }

    /// Map an IRI to a file path; None means there is no valid file for
    /// it.  Non-existent files are fine to return.
    fn get_file(&self, iri: &Url) -> Option<PathBuf>;
}

/// Maps resource names to the contents of a folder.
pub struct FileScheme {
    folder: PathBuf,
}

impl FileScheme {
    pub fn new(folder: impl Into<PathBuf>) -> FileScheme {
        FileScheme {
            folder: folder.into(),
        }
    }
}

impl ResourceScheme for FileScheme {
    fn accepts_iri(&self, iri: &Url) -> bool {
        iri.host().is_none() && iri.query().is_none()
    }

    fn get_file(&self, iri: &Url) -> Option<PathBuf> {
        let decoded =
            percent_decode_str(iri.path()).decode_utf8().ok()?;
        Some(self.folder.join(decoded.trim_start_matches('/')))
    }
}

///// UNIVERSE

struct Universe {
    resources: HashMap<String, Resource>,
    schemes: HashMap<String, Rc<dyn ResourceScheme>>,
    /// Names the resource under active construction, so serialization of
    /// relative IRIs and locations has a base.
    current: Vec<Resource>,
    file_root: PathBuf,
}

thread_local! {
    static UNIVERSE: RefCell<Universe> = RefCell::new(Universe {
        resources: HashMap::new(),
        schemes: HashMap::new(),
        current: Vec::new(),
        file_root: PathBuf::from("."),
    });
}

/// Register a scheme under its name.  Names must match
/// `[a-z][a-z0-9+.-]*`.
pub fn register_scheme(
    name: &str,
    scheme: impl ResourceScheme + 'static,
) -> Result<()> {
    let valid = name
        .bytes()
        .enumerate()
        .all(|(i, c)| {
            if i == 0 {
                c.is_ascii_lowercase()
            } else {
                c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || matches!(c, b'+' | b'.' | b'-')
            }
        })
        && !name.is_empty();
    if !valid {
        return Err(Error::InvalidResourceName {
            name: name.to_owned(),
        });
    }
    UNIVERSE.with(|u| {
        let mut u = u.borrow_mut();
        if u.schemes.contains_key(name) {
            return Err(Error::DuplicateResourceScheme {
                scheme: name.to_owned(),
            });
        }
        u.schemes.insert(name.to_owned(), Rc::new(scheme));
        Ok(())
    })
}

/// Set the root directory of the default `file` scheme (used only when no
/// scheme is registered).
pub fn set_default_file_root(root: impl Into<PathBuf>) {
    UNIVERSE.with(|u| u.borrow_mut().file_root = root.into());
}

fn require_scheme(iri: &Url) -> Result<Rc<dyn ResourceScheme>> {
    UNIVERSE.with(|u| {
        let u = u.borrow();
        if let Some(s) = u.schemes.get(iri.scheme()) {
            return Ok(s.clone());
        }
        if u.schemes.is_empty() && iri.scheme() == "file" {
            return Ok(Rc::new(FileScheme::new(u.file_root.clone()))
                as Rc<dyn ResourceScheme>);
        }
        Err(Error::UnknownResourceScheme {
            scheme: iri.scheme().to_owned(),
        })
    })
}

/// The resource currently being loaded, saved, or reloaded, if any.
pub fn current_resource() -> Option<Resource> {
    UNIVERSE.with(|u| u.borrow().current.last().cloned())
}

pub(crate) struct CurrentResourceGuard(());

pub(crate) fn push_current_resource(res: Resource) -> CurrentResourceGuard {
    UNIVERSE.with(|u| u.borrow_mut().current.push(res));
    CurrentResourceGuard(())
}

impl Drop for CurrentResourceGuard {
    fn drop(&mut self) {
        UNIVERSE.with(|u| {
            u.borrow_mut().current.pop();
        });
    }
}

/// All resources whose state is not Unloaded.
pub fn loaded_resources() -> Vec<Resource> {
    UNIVERSE.with(|u| {
        u.borrow()
            .resources
            .values()
            .filter(|r| r.state() != ResourceState::Unloaded)
            .cloned()
            .collect()
    })
}

///// RESOURCE HANDLES

impl Resource {
    /// Refer to the resource with this name without loading it.  Relative
    /// names resolve against the current resource; `#` alone names the
    /// current resource itself.
    pub fn new(name: &str) -> Result<Resource> {
        let base = current_resource().map(|r| r.name());
        if name == "#" {
            if let Some(res) = current_resource() {
                return Ok(res);
            }
        }
        Resource::from_url(resolve_iri(name, base.as_ref())?)
    }

    /// Refer to the resource named by an IRI (any fragment is dropped).
    pub fn from_url(mut iri: Url) -> Result<Resource> {
        iri.set_fragment(None);
        let scheme = require_scheme(&iri)?;
        if !scheme.accepts_iri(&iri) {
            return Err(Error::UnacceptableResourceName {
                name: iri.to_string(),
            });
        }
        Ok(UNIVERSE.with(|u| {
            let mut u = u.borrow_mut();
            u.resources
                .entry(iri.to_string())
                .or_insert_with(|| Resource {
                    data: Rc::new(RefCell::new(ResourceData {
                        name: iri,
                        value: Dynamic::empty(),
                        old_value: Dynamic::empty(),
                        state: ResourceState::Unloaded,
                    })),
                })
                .clone()
        }))
    }

    /// Create the resource already loaded with the given value, without
    /// reading from disk.  Fails if a resource with this name is already
    /// loaded.
    pub fn with_value(name: &str, value: Dynamic) -> Result<Resource> {
        let res = Resource::new(name)?;
        if res.state() != ResourceState::Unloaded {
            return Err(res.invalid_state("construct"));
        }
        res.set_value(value)?;
        Ok(res)
    }

    /// The resource's name in absolute form.
    pub fn name(&self) -> Url {
        self.data.borrow().name.clone()
    }

    pub fn state(&self) -> ResourceState {
        self.data.borrow().state
    }

    fn set_state(&self, state: ResourceState) {
        self.data.borrow_mut().state = state;
    }

    fn invalid_state(&self, tried: &'static str) -> Error {
        Error::InvalidResourceState {
            tried,
            state: self.state(),
            name: self.name().to_string(),
        }
    }

    /// The type of the loaded value, if any.
    pub fn value_type(&self) -> Type {
        self.data.borrow().value.ty()
    }

    /// Replace the value directly.  Transitions Unloaded to Loaded.
    pub fn set_value(&self, value: Dynamic) -> Result<()> {
        if value.is_empty() {
            return Err(Error::EmptyResourceValue {
                name: self.name().to_string(),
            });
        }
        let scheme = require_scheme(&self.name())?;
        if !scheme.accepts_type(value.ty()) {
            return Err(Error::UnacceptableResourceType {
                name: self.name().to_string(),
                type_name: value.ty().name().to_owned(),
            });
        }
        match self.state() {
            ResourceState::Unloaded => {
                self.set_state(ResourceState::Loaded)
            }
            ResourceState::LoadConstructing | ResourceState::Loaded => {}
            _ => return Err(self.invalid_state("set_value")),
        }
        self.data.borrow_mut().value = value;
        Ok(())
    }

    /// A reference to the loaded value, loading from disk if necessary.
    pub fn reference(&self) -> Result<Reference> {
        if self.state() == ResourceState::Unloaded {
            load(self)?;
        }
        let data = self.data.borrow();
        if data.value.is_empty() {
            return Err(Error::EmptyResourceValue {
                name: data.name.to_string(),
            });
        }
        Ok(data.value.ptr().into())
    }

    /// A reference to the value without loading; None if unloaded or the
    /// value is (still) empty.
    pub fn get_reference(&self) -> Option<Reference> {
        let data = self.data.borrow();
        if data.state == ResourceState::Unloaded || data.value.is_empty() {
            None
        } else {
            Some(data.value.ptr().into())
        }
    }

    /// A reference to the resource's Dynamic slot itself, which is what
    /// serializes to and from disk (as `[type value]`).
    fn value_slot(&self) -> Reference {
        let mut data = self.data.borrow_mut();
        let p = &mut data.value as *mut Dynamic;
        drop(data);
        Reference::to_mut(unsafe { &mut *p })
    }

    fn old_value_reference(&self) -> Option<Reference> {
        let data = self.data.borrow();
        if data.old_value.is_empty() {
            None
        } else {
            Some(data.old_value.ptr().into())
        }
    }

    fn clear_value(&self) {
        self.data.borrow_mut().value = Dynamic::empty();
    }
}

///// OPERATIONS

fn scheme_and_file(res: &Resource) -> Result<(Rc<dyn ResourceScheme>, PathBuf)> {
    let name = res.name();
    let scheme = require_scheme(&name)?;
    let file = scheme.get_file(&name).ok_or_else(|| {
        Error::UnacceptableResourceName {
            name: name.to_string(),
        }
    })?;
    Ok((scheme, file))
}

/// The file a resource maps to on disk.
pub fn resource_filename(res: &Resource) -> Result<PathBuf> {
    Ok(scheme_and_file(res)?.1)
}

/// Check the top-level type named in a freshly-parsed tree against the
/// scheme before constructing anything from it.
fn verify_tree_for_scheme(
    res: &Resource,
    scheme: &dyn ResourceScheme,
    tree: &Tree,
) -> Result<()> {
    if let Some(e0) = tree.elem(0) {
        if let Ok(name) = <&str>::try_from(e0) {
            let ty = Type::from_name(name)?;
            if !scheme.accepts_type(ty) {
                return Err(Error::UnacceptableResourceType {
                    name: res.name().to_string(),
                    type_name: name.to_owned(),
                });
            }
        }
    }
    Ok(())
}

pub fn load(res: &Resource) -> Result<()> {
    load_all(std::slice::from_ref(res))
}

/// Load a batch.  On failure every resource in the batch is rolled back to
/// Unloaded (resources that were already loaded are untouched).
pub fn load_all(reses: &[Resource]) -> Result<()> {
    let mut rs = Vec::new();
    for res in reses {
        match res.state() {
            ResourceState::Unloaded => rs.push(res.clone()),
            ResourceState::Loaded | ResourceState::LoadConstructing => {}
            _ => return Err(res.invalid_state("load")),
        }
    }
    for res in &rs {
        res.set_state(ResourceState::LoadConstructing);
    }
    let result = (|| {
        for res in &rs {
            let _g = push_current_resource(res.clone());
            let (scheme, filename) = scheme_and_file(res)?;
            let tree = tree_from_file(&filename)?;
            verify_tree_for_scheme(res, &*scheme, &tree)?;
            item_from_tree(
                &res.value_slot(),
                &tree,
                &Location::root(res.clone()),
                false,
            )?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => {
            for res in &rs {
                res.set_state(ResourceState::Loaded);
            }
            Ok(())
        }
        Err(e) => {
            for res in &rs {
                res.set_state(ResourceState::LoadRollback);
            }
            for res in &rs {
                res.clear_value();
                res.set_state(ResourceState::Unloaded);
            }
            Err(e)
        }
    }
}

/// Move a value from one name to another.  Afterwards `old_res` is
/// Unloaded and `new_res` is Loaded.  Does not touch any files.
pub fn rename(old_res: &Resource, new_res: &Resource) -> Result<()> {
    if old_res.state() != ResourceState::Loaded {
        return Err(old_res.invalid_state("rename from"));
    }
    if new_res.state() != ResourceState::Unloaded {
        return Err(new_res.invalid_state("rename to"));
    }
    let value =
        std::mem::replace(&mut old_res.data.borrow_mut().value, Dynamic::empty());
    new_res.data.borrow_mut().value = value;
    new_res.set_state(ResourceState::Loaded);
    old_res.set_state(ResourceState::Unloaded);
    Ok(())
}

pub fn save(res: &Resource) -> Result<()> {
    save_all(std::slice::from_ref(res))
}

/// Save a batch.  No file is written until every resource in the batch has
/// serialized successfully; the writes themselves then proceed best-effort.
pub fn save_all(reses: &[Resource]) -> Result<()> {
    for res in reses {
        if res.state() != ResourceState::Loaded {
            return Err(res.invalid_state("save"));
        }
    }
    let result = (|| {
        for res in reses {
            res.set_state(ResourceState::SaveVerifying);
        }
        // Serialize everything before writing anything
        let mut committers = Vec::with_capacity(reses.len());
        for res in reses {
            let _g = push_current_resource(res.clone());
            if res.get_reference().is_none() {
                return Err(Error::EmptyResourceValue {
                    name: res.name().to_string(),
                });
            }
            let (scheme, filename) = scheme_and_file(res)?;
            if !scheme.accepts_type(res.value_type()) {
                return Err(Error::UnacceptableResourceType {
                    name: res.name().to_string(),
                    type_name: res.value_type().name().to_owned(),
                });
            }
            let tree = item_to_tree(
                &res.value_slot(),
                &Location::root(res.clone()),
            )?;
            let contents = tree_to_string(&tree, PrintOptions::pretty());
            committers.push((contents, filename));
        }
        for res in reses {
            res.set_state(ResourceState::SaveCommitting);
        }
        for (contents, filename) in committers {
            string_to_file(&contents, &filename)?;
        }
        Ok(())
    })();
    for res in reses {
        res.set_state(ResourceState::Loaded);
    }
    result
}

pub fn unload(res: &Resource) -> Result<()> {
    unload_all(std::slice::from_ref(res))
}

/// Unload a batch.  Scans all other loaded resources for references into
/// the batch; if any exist, fails with [`Error::UnloadWouldBreak`] and no
/// state changes.  Unloading an entire connected component at once is
/// always permitted.
pub fn unload_all(reses: &[Resource]) -> Result<()> {
    let mut rs = Vec::new();
    for res in reses {
        match res.state() {
            ResourceState::Unloaded => {}
            ResourceState::Loaded => rs.push(res.clone()),
            _ => return Err(res.invalid_state("unload")),
        }
    }
    // Verify step
    let verify = (|| {
        for res in &rs {
            res.set_state(ResourceState::UnloadVerifying);
        }
        let mut others = Vec::new();
        for other in loaded_resources() {
            match other.state() {
                ResourceState::UnloadVerifying => {}
                ResourceState::Loaded => others.push(other),
                _ => {
                    return Err(
                        other.invalid_state("scan during unload")
                    )
                }
            }
        }
        // Unloading everything at once needs no scan
        if !others.is_empty() {
            verify_no_inbound_references(&rs, &others)?;
        }
        Ok(())
    })();
    if let Err(e) = verify {
        for res in &rs {
            res.set_state(ResourceState::Loaded);
        }
        return Err(e);
    }
    // Destruct step
    for res in &rs {
        res.set_state(ResourceState::UnloadCommitting);
    }
    for res in &rs {
        res.clear_value();
        res.set_state(ResourceState::Unloaded);
    }
    Ok(())
}

/// Find a reference in `others` pointing into any of `rs`.
fn verify_no_inbound_references(
    rs: &[Resource],
    others: &[Resource],
) -> Result<()> {
    let ref_type = Type::of::<Reference>();
    // The set of references reachable from the resources being unloaded
    let mut ref_set: HashMap<Reference, Location> = HashMap::new();
    for res in rs {
        recursive_scan_resource(res, &mut |item, loc| {
            ref_set.insert(item.clone(), loc.clone());
            Ok(())
        })?;
    }
    for other in others {
        recursive_scan_resource(other, &mut |item, loc| {
            if item.type_of() != ref_type {
                return Ok(());
            }
            let target = item.get_as::<Reference>()?;
            if let Some(to) = ref_set.get(&target) {
                return Err(Error::UnloadWouldBreak {
                    from: loc.clone(),
                    to: to.clone(),
                });
            }
            Ok(())
        })?;
    }
    Ok(())
}

pub fn force_unload(res: &Resource) -> Result<()> {
    force_unload_all(std::slice::from_ref(res))
}

/// Unload without scanning for inbound references.  Faster, but any such
/// references are left dangling.
pub fn force_unload_all(reses: &[Resource]) -> Result<()> {
    let mut rs = Vec::new();
    for res in reses {
        match res.state() {
            ResourceState::Unloaded => {}
            ResourceState::Loaded => rs.push(res.clone()),
            _ => return Err(res.invalid_state("force_unload")),
        }
    }
    for res in &rs {
        res.set_state(ResourceState::UnloadCommitting);
    }
    for res in &rs {
        res.clear_value();
        res.set_state(ResourceState::Unloaded);
    }
    Ok(())
}

pub fn reload(res: &Resource) -> Result<()> {
    reload_all(std::slice::from_ref(res))
}

/// Reload a batch from disk.  References elsewhere that point into the old
/// values are re-resolved by location against the new values; if any
/// cannot be, the whole batch rolls back to the old values and the call
/// fails with [`Error::ReloadWouldBreak`].
pub fn reload_all(reses: &[Resource]) -> Result<()> {
    for res in reses {
        if res.state() != ResourceState::Loaded {
            return Err(res.invalid_state("reload"));
        }
    }
    // Move values aside; this can't fail
    for res in reses {
        res.set_state(ResourceState::ReloadConstructing);
        let mut data = res.data.borrow_mut();
        data.old_value =
            std::mem::replace(&mut data.value, Dynamic::empty());
    }
    let mut updates: Vec<(Reference, Reference)> = Vec::new();
    let result = (|| {
        // Construct step
        for res in reses {
            let _g = push_current_resource(res.clone());
            let (scheme, filename) = scheme_and_file(res)?;
            let tree = tree_from_file(&filename)?;
            verify_tree_for_scheme(res, &*scheme, &tree)?;
            item_from_tree(
                &res.value_slot(),
                &tree,
                &Location::root(res.clone()),
                false,
            )?;
        }
        for res in reses {
            res.set_state(ResourceState::ReloadVerifying);
        }
        // Verify step
        let mut others = Vec::new();
        for other in loaded_resources() {
            match other.state() {
                ResourceState::ReloadVerifying => {}
                ResourceState::Loaded => others.push(other),
                _ => {
                    return Err(
                        other.invalid_state("scan during reload")
                    )
                }
            }
        }
        if !others.is_empty() {
            let ref_type = Type::of::<Reference>();
            // Locations of everything reachable from the old values
            let mut old_refs: HashMap<Reference, Location> =
                HashMap::new();
            for res in reses {
                if let Some(old) = res.old_value_reference() {
                    recursive_scan(
                        &old,
                        &Location::root(res.clone()),
                        &mut |item, loc| {
                            old_refs
                                .insert(item.clone(), loc.clone());
                            Ok(())
                        },
                    )?;
                }
            }
            // Re-resolve each inbound reference against the new values
            for other in &others {
                recursive_scan_resource(other, &mut |item, loc| {
                    if item.type_of() != ref_type {
                        return Ok(());
                    }
                    let target = item.get_as::<Reference>()?;
                    let Some(old_loc) = old_refs.get(&target) else {
                        return Ok(());
                    };
                    match crate::scan::reference_from_location(old_loc)
                    {
                        Ok(new_ref) => {
                            updates.push((item.clone(), new_ref));
                            Ok(())
                        }
                        Err(_) => Err(Error::ReloadWouldBreak {
                            from: loc.clone(),
                            to: old_loc.clone(),
                        }),
                    }
                })?;
            }
        }
        Ok(())
    })();
    if let Err(e) = result {
        for res in reses {
            res.set_state(ResourceState::ReloadRollback);
        }
        for res in reses {
            let mut data = res.data.borrow_mut();
            data.value = std::mem::replace(
                &mut data.old_value,
                Dynamic::empty(),
            );
        }
        for res in reses {
            res.set_state(ResourceState::Loaded);
        }
        return Err(e);
    }
    // Commit step: point the collected references at the new values
    for (item, new_ref) in updates {
        let write = if let Some(addr) = item.address() {
            unsafe {
                *(addr as *mut Reference) = new_ref;
            }
            Ok(())
        } else {
            item.set_as::<Reference>(new_ref)
        };
        if let Err(e) = write {
            unrecoverable(&e, "while updating references for reload");
        }
    }
    // Destruct step
    for res in reses {
        res.set_state(ResourceState::ReloadCommitting);
    }
    for res in reses {
        res.data.borrow_mut().old_value = Dynamic::empty();
        res.set_state(ResourceState::Loaded);
    }
    Ok(())
}

/// Delete the resource's source file.  Does not change its state or
/// value; missing files are fine.
pub fn remove_source(res: &Resource) -> Result<()> {
    let (_, filename) = scheme_and_file(res)?;
    match std::fs::remove_file(&filename) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::RemoveSourceFailed {
            name: res.name().to_string(),
            message: e.to_string(),
        }),
    }
}

/// Whether the resource's file exists on disk.
pub fn source_exists(res: &Resource) -> Result<bool> {
    let (_, filename) = scheme_and_file(res)?;
    Ok(Path::new(&filename).exists())
}

/// Errors during a commit or rollback phase leave the universe in a state
/// that can't be reasoned about, so log and abort.
fn unrecoverable(e: &Error, context: &str) -> ! {
    log::error!("unrecoverable error {}: {}", context, e);
    std::process::abort();
}

#[cfg(test)]
pub(crate) fn test_scheme(name: &str) {
    // Ignore duplicate registration across tests in the same thread
    let _ = register_scheme(name, FileScheme::new(std::env::temp_dir()));
}
