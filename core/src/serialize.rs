//! The serialization engine: transforms items to and from trees based on
//! the information in their descriptions.
//!
//! A traversal is a stack-allocated node in a singly-linked chain recording
//! how the engine reached the current item.  It never escapes the call
//! stack; from it, [`Reference`]s and [`Location`]s to the current item can
//! be reconstituted on demand (cheaply when the item is addressable).
//!
//! Swizzle and init callbacks never run inline: they are queued as each
//! subtree finishes its structural assignment and drained after the
//! outermost `from_tree` completes, children before parents, all swizzles
//! before any init.  Passing `delay_swizzle` to a nested [`item_from_tree`]
//! moves the drain responsibility up to the enclosing invocation, which is
//! what allows cyclic references within a single resource.

use crate::accessor::{AccessOp, Accessor, AttrFnPtr, ElemFnPtr};
use crate::describe::{Description, Preference};
use crate::dynamic::Pointer;
use crate::error::{Error, Result};
use crate::location::Location;
use crate::parse::tree_from_string;
use crate::print::{tree_to_string, PrintOptions};
use crate::reference::Reference;
use crate::registry::{Mu, Type};
use crate::resource::{current_resource, push_current_resource, Resource};
use crate::tree::{Form, Tree, TreePair};
use std::cell::{Cell, RefCell};
use std::path::Path;

///// TRAVERSAL

#[derive(Clone)]
pub(crate) enum TravKind<'a> {
    Start {
        reference: &'a Reference,
        location: &'a Location,
    },
    Delegate {
        acr: &'static Accessor,
    },
    Attr {
        acr: &'static Accessor,
        key: &'a str,
    },
    AttrFunc {
        f: AttrFnPtr,
        key: &'a str,
    },
    Elem {
        acr: &'static Accessor,
        index: usize,
    },
    ElemFunc {
        f: ElemFnPtr,
        index: usize,
    },
}

pub(crate) struct Traversal<'a> {
    parent: Option<&'a Traversal<'a>>,
    desc: &'static Description,
    item: *mut Mu,
    /// Whether the item has a stable address, so references to it can use
    /// the address directly instead of chaining from the parent.
    addressable: bool,
    readonly: bool,
    kind: TravKind<'a>,
}

pub(crate) type TravCb<'c> =
    &'c mut dyn for<'t> FnMut(&'t Traversal<'t>) -> Result<()>;

thread_local! {
    static CURRENT_TRAV: Cell<*const ()> = const { Cell::new(std::ptr::null()) };
    static SWIZZLE_OPS: RefCell<Vec<SwizzleOp>> = const { RefCell::new(Vec::new()) };
    static INIT_OPS: RefCell<Vec<InitOp>> = const { RefCell::new(Vec::new()) };
    static IN_FROM_TREE: Cell<bool> = const { Cell::new(false) };
    static DIAG_COUNT: Cell<u32> = const { Cell::new(0) };
}

struct CurTravGuard {
    prev: *const (),
}

impl CurTravGuard {
    fn push(trav: &Traversal) -> CurTravGuard {
        let prev = CURRENT_TRAV
            .with(|c| c.replace(trav as *const Traversal as *const ()));
        CurTravGuard { prev }
    }
}

impl Drop for CurTravGuard {
    fn drop(&mut self) {
        CURRENT_TRAV.with(|c| c.set(self.prev));
    }
}

/// The location of the item currently being serialized, if a serialization
/// operation is active.  Falls back to the current resource's root during
/// swizzle/init drains.
pub fn current_location() -> Location {
    let p = CURRENT_TRAV.with(|c| c.get());
    if !p.is_null() {
        let trav = unsafe { &*(p as *const Traversal) };
        trav_location(trav)
    } else if let Some(res) = current_resource() {
        Location::root(res)
    } else {
        Location::empty()
    }
}

pub(crate) fn trav_start(
    r: &Reference,
    loc: &Location,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    let desc = r.type_of().require_description()?;
    let addressable = r.address().is_some();
    let readonly = r.readonly();
    r.access(op, &mut |item| {
        let trav = Traversal {
            parent: None,
            desc,
            item,
            addressable,
            readonly,
            kind: TravKind::Start {
                reference: r,
                location: loc,
            },
        };
        let _g = CurTravGuard::push(&trav);
        cb(&trav)
    })
}

fn trav_follow_acr<'a>(
    parent: &'a Traversal<'a>,
    acr: &'static Accessor,
    op: AccessOp,
    kind: TravKind<'a>,
    cb: TravCb,
) -> Result<()> {
    let desc = acr.to_type(Some(parent.item)).require_description()?;
    let addressable = (parent.addressable || acr.anchored)
        && unsafe { acr.address(parent.item) }.is_some();
    let readonly = parent.readonly || acr.readonly;
    unsafe {
        acr.access(op, parent.item, &mut |item| {
            let trav = Traversal {
                parent: Some(parent),
                desc,
                item,
                addressable,
                readonly,
                kind: kind.clone(),
            };
            let _g = CurTravGuard::push(&trav);
            cb(&trav)
        })
    }
}

fn trav_delegate<'a>(
    parent: &'a Traversal<'a>,
    acr: &'static Accessor,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    trav_follow_acr(parent, acr, op, TravKind::Delegate { acr }, cb)
}

fn trav_attr<'a>(
    parent: &'a Traversal<'a>,
    acr: &'static Accessor,
    key: &'a str,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    trav_follow_acr(parent, acr, op, TravKind::Attr { acr, key }, cb)
}

fn trav_elem<'a>(
    parent: &'a Traversal<'a>,
    acr: &'static Accessor,
    index: usize,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    trav_follow_acr(parent, acr, op, TravKind::Elem { acr, index }, cb)
}

fn trav_attr_func<'a>(
    parent: &'a Traversal<'a>,
    r: &Reference,
    f: AttrFnPtr,
    key: &'a str,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    let desc = r.type_of().require_description()?;
    let addressable = parent.addressable && r.address().is_some();
    let readonly = parent.readonly || r.readonly();
    r.access(op, &mut |item| {
        let trav = Traversal {
            parent: Some(parent),
            desc,
            item,
            addressable,
            readonly,
            kind: TravKind::AttrFunc { f, key },
        };
        let _g = CurTravGuard::push(&trav);
        cb(&trav)
    })
}

fn trav_elem_func<'a>(
    parent: &'a Traversal<'a>,
    r: &Reference,
    f: ElemFnPtr,
    index: usize,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    let desc = r.type_of().require_description()?;
    let addressable = parent.addressable && r.address().is_some();
    let readonly = parent.readonly || r.readonly();
    r.access(op, &mut |item| {
        let trav = Traversal {
            parent: Some(parent),
            desc,
            item,
            addressable,
            readonly,
            kind: TravKind::ElemFunc { f, index },
        };
        let _g = CurTravGuard::push(&trav);
        cb(&trav)
    })
}

/// Reconstitute a Reference to the current item.
pub(crate) fn trav_reference(trav: &Traversal) -> Reference {
    if trav.addressable {
        let ty = Type::from_description(trav.desc, trav.readonly);
        Pointer::raw(ty, trav.item).into()
    } else {
        match &trav.kind {
            TravKind::Start { reference, .. } => (*reference).clone(),
            TravKind::Delegate { acr }
            | TravKind::Attr { acr, .. }
            | TravKind::Elem { acr, .. } => {
                let parent =
                    trav.parent.expect("non-start traversal has a parent");
                trav_reference(parent)
                    .chain(crate::accessor::AcrRef::Static(*acr))
            }
            TravKind::AttrFunc { f, key } => {
                let parent =
                    trav.parent.expect("non-start traversal has a parent");
                trav_reference(parent).chain_attr_func(*f, key)
            }
            TravKind::ElemFunc { f, index } => {
                let parent =
                    trav.parent.expect("non-start traversal has a parent");
                trav_reference(parent).chain_elem_func(*f, *index)
            }
        }
    }
}

/// Build a Location for the current item, one allocation per segment.
pub(crate) fn trav_location(trav: &Traversal) -> Location {
    match &trav.kind {
        TravKind::Start { location, .. } => (*location).clone(),
        TravKind::Delegate { .. } => {
            trav_location(trav.parent.expect("delegate has a parent"))
        }
        TravKind::Attr { key, .. } | TravKind::AttrFunc { key, .. } => {
            trav_location(trav.parent.expect("attr has a parent"))
                .child_key(*key)
        }
        TravKind::Elem { index, .. }
        | TravKind::ElemFunc { index, .. } => {
            trav_location(trav.parent.expect("elem has a parent"))
                .child_index(*index)
        }
    }
}

///// DIAGNOSTICS

/// While a value of this type is alive, errors raised during `to_tree` are
/// embedded in the output as error-form trees instead of aborting the
/// serialization.  The output is not valid to read back in; use it for
/// error messages only.
pub struct DiagnosticSerialization(());

impl DiagnosticSerialization {
    pub fn new() -> DiagnosticSerialization {
        DIAG_COUNT.with(|c| c.set(c.get() + 1));
        DiagnosticSerialization(())
    }
}

impl Default for DiagnosticSerialization {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiagnosticSerialization {
    fn drop(&mut self) {
        DIAG_COUNT.with(|c| c.set(c.get() - 1));
    }
}

fn diagnostics_active() -> bool {
    DIAG_COUNT.with(|c| c.get()) > 0
}

///// TO TREE

fn ser_to_tree(trav: &Traversal) -> Result<Tree> {
    match ser_to_tree_inner(trav) {
        Err(e) => {
            // Errors raised deep inside an accessor chain get the current
            // location attached here
            let e = e.with_location(&trav_location(trav));
            if diagnostics_active() {
                Ok(Tree::error(e))
            } else {
                Err(e)
            }
        }
        ok => ok,
    }
}

fn ser_to_tree_inner(trav: &Traversal) -> Result<Tree> {
    let desc = trav.desc;
    if let Some(to_tree) = &desc.to_tree {
        return to_tree(trav.item as *const Mu);
    }
    if let Some(values) = &desc.values {
        for (name, stored) in &values.entries {
            if (values.eq)(trav.item as *const Mu, stored.data as *const Mu)
            {
                return Ok(name.clone());
            }
        }
    }
    match desc.preference() {
        Preference::Object => {
            let mut ks = Vec::new();
            ser_collect_keys(trav, &mut ks)?;
            let parent_readonly = trav.readonly;
            let mut o = Vec::<TreePair>::with_capacity(ks.len());
            for k in &ks {
                ser_attr(trav, k, AccessOp::Read, &mut |child| {
                    // Attrs whose own accessor is readonly are dropped;
                    // they can't round-trip.  Readonly-ness inherited from
                    // the host doesn't count against the attr.
                    if !child.readonly || parent_readonly {
                        o.push((k.clone(), ser_to_tree(child)?));
                    }
                    Ok(())
                })?;
            }
            Ok(Tree::from(o))
        }
        Preference::Array => {
            let len = ser_get_length(trav)?;
            let mut a = Vec::with_capacity(len);
            for i in 0..len {
                ser_elem(trav, i, AccessOp::Read, &mut |child| {
                    a.push(ser_to_tree(child)?);
                    Ok(())
                })?;
            }
            Ok(Tree::from(a))
        }
        Preference::Neither => {
            if let Some(acr) = desc.delegate.as_ref() {
                let mut r = Tree::default();
                trav_delegate(trav, acr, AccessOp::Read, &mut |child| {
                    r = ser_to_tree(child)?;
                    Ok(())
                })?;
                Ok(r)
            } else if desc.values.is_some() {
                Err(Error::NoNameForValue {
                    location: trav_location(trav),
                })
            } else {
                Err(Error::CannotToTree {
                    location: trav_location(trav),
                })
            }
        }
    }
}

/// Convert an item to a tree.  The location, if given, is used in error
/// messages and by location-aware descriptions (references, IRIs).
pub fn item_to_tree(item: &Reference, loc: &Location) -> Result<Tree> {
    let mut r = Tree::default();
    trav_start(item, loc, AccessOp::Read, &mut |trav| {
        r = ser_to_tree(trav)?;
        Ok(())
    })?;
    Ok(r)
}

///// FROM TREE

struct SwizzleOp {
    desc: &'static Description,
    item: Reference,
    tree: Tree,
    res: Option<Resource>,
}

struct InitOp {
    desc: &'static Description,
    item: Reference,
    res: Option<Resource>,
}

fn ser_from_tree(trav: &Traversal, tree: &Tree) -> Result<()> {
    ser_from_tree_inner(trav, tree)
        .map_err(|e| e.with_location(&trav_location(trav)))?;
    // Register swizzle and init now rather than up front, so children get
    // swizzled and initted before their parent
    let desc = trav.desc;
    if desc.swizzle.is_some() || desc.init.is_some() {
        let item = trav_reference(trav);
        let res = current_resource();
        if desc.swizzle.is_some() {
            SWIZZLE_OPS.with(|q| {
                q.borrow_mut().push(SwizzleOp {
                    desc,
                    item: item.clone(),
                    tree: tree.clone(),
                    res: res.clone(),
                })
            });
        }
        if desc.init.is_some() {
            INIT_OPS.with(|q| {
                q.borrow_mut().push(InitOp { desc, item, res })
            });
        }
    }
    Ok(())
}

fn ser_from_tree_inner(trav: &Traversal, tree: &Tree) -> Result<()> {
    let desc = trav.desc;
    // An explicit from_tree facet trumps everything
    if let Some(from_tree) = &desc.from_tree {
        return from_tree(trav.item, tree);
    }
    // Then the behavior depends on the form of the given tree
    match tree.form() {
        Form::Object if desc.accepts_object() => {
            let pairs = <&[TreePair]>::try_from(tree)?;
            let ks: Vec<String> =
                pairs.iter().map(|(k, _)| k.clone()).collect();
            ser_set_keys(trav, ks)?;
            for (k, v) in pairs {
                ser_attr(trav, k, AccessOp::Write, &mut |child| {
                    ser_from_tree(child, v)
                })?;
            }
            return Ok(());
        }
        Form::Array if desc.accepts_array() => {
            let a = <&[Tree]>::try_from(tree)?;
            ser_set_length(trav, a.len())?;
            for (i, v) in a.iter().enumerate() {
                ser_elem(trav, i, AccessOp::Write, &mut |child| {
                    ser_from_tree(child, v)
                })?;
            }
            return Ok(());
        }
        Form::Error => {
            return Err(tree.as_error().expect("error form").clone())
        }
        _ => {
            // Scalar forms consult the values facet
            if let Some(values) = &desc.values {
                for (name, stored) in &values.entries {
                    if name == tree {
                        return (values.assign)(
                            trav.item,
                            stored.data as *const Mu,
                        );
                    }
                }
            }
        }
    }
    // Nothing matched, so fall through to the delegate
    if let Some(acr) = desc.delegate.as_ref() {
        return trav_delegate(trav, acr, AccessOp::Write, &mut |child| {
            ser_from_tree(child, tree)
        });
    }
    // A lone swizzle facet means "done for now"
    if desc.swizzle.is_some() {
        return Ok(());
    }
    // Nothing works; figure out the most helpful error
    let location = trav_location(trav);
    match tree.form() {
        Form::Object
            if desc.values.is_some() || desc.accepts_array() =>
        {
            Err(Error::InvalidForm {
                location,
                tree: tree.clone(),
            })
        }
        Form::Array
            if desc.values.is_some() || desc.accepts_object() =>
        {
            Err(Error::InvalidForm {
                location,
                tree: tree.clone(),
            })
        }
        _ if desc.accepts_array() || desc.accepts_object() => {
            Err(Error::InvalidForm {
                location,
                tree: tree.clone(),
            })
        }
        _ if desc.values.is_some() => Err(Error::NoValueForName {
            location,
            tree: tree.clone(),
        }),
        _ => Err(Error::CannotFromTree { location }),
    }
}

fn drain_swizzles_from(mark: usize) -> Result<()> {
    // Swizzling might enqueue more swizzle ops; keep going until dry
    loop {
        let ops = SWIZZLE_OPS.with(|q| {
            let mut q = q.borrow_mut();
            if q.len() > mark {
                q.split_off(mark)
            } else {
                Vec::new()
            }
        });
        if ops.is_empty() {
            return Ok(());
        }
        for op in ops {
            let _g = op.res.clone().map(push_current_resource);
            let swizzle = op.desc.swizzle.as_ref().expect("queued swizzle");
            op.item
                .access(AccessOp::Modify, &mut |p| swizzle(p, &op.tree))?;
        }
    }
}

fn drain_inits_from(s_mark: usize, i_mark: usize) -> Result<()> {
    loop {
        let ops = INIT_OPS.with(|q| {
            let mut q = q.borrow_mut();
            if q.len() > i_mark {
                q.split_off(i_mark)
            } else {
                Vec::new()
            }
        });
        if ops.is_empty() {
            return Ok(());
        }
        for op in ops {
            {
                let _g = op.res.clone().map(push_current_resource);
                let init = op.desc.init.as_ref().expect("queued init");
                op.item.access(AccessOp::Modify, &mut |p| init(p))?;
            }
            // Initting might even enqueue more swizzle ops
            drain_swizzles_from(s_mark)?;
        }
    }
}

/// Write to an item from a tree.
///
/// If this call is nested inside another `item_from_tree` and
/// `delay_swizzle` is true, the item's swizzle and init operations are
/// deferred to the enclosing invocation's drain, which allows items to
/// cyclically reference one another.  Only pass it if the written item will
/// still be valid then (not a stack temporary about to be moved) and its
/// treatment does not depend on its value.
///
/// On an error from a top-level call, both queues are cleared before the
/// error propagates, and the item may be left incomplete; callers that care
/// construct into a fresh value and move it over on success (resource
/// reload does exactly that).
pub fn item_from_tree(
    item: &Reference,
    tree: &Tree,
    loc: &Location,
    delay_swizzle: bool,
) -> Result<()> {
    let nested = IN_FROM_TREE.with(|c| c.get());
    if nested && delay_swizzle {
        return trav_start(item, loc, AccessOp::Write, &mut |trav| {
            ser_from_tree(trav, tree)
        });
    }
    let s_mark = SWIZZLE_OPS.with(|q| q.borrow().len());
    let i_mark = INIT_OPS.with(|q| q.borrow().len());
    if !nested {
        debug_assert!(s_mark == 0 && i_mark == 0);
        IN_FROM_TREE.with(|c| c.set(true));
    }
    let result = (|| {
        trav_start(item, loc, AccessOp::Write, &mut |trav| {
            ser_from_tree(trav, tree)
        })?;
        drain_swizzles_from(s_mark)?;
        drain_inits_from(s_mark, i_mark)?;
        Ok(())
    })();
    if !nested {
        IN_FROM_TREE.with(|c| c.set(false));
        if result.is_err() {
            SWIZZLE_OPS.with(|q| q.borrow_mut().clear());
            INIT_OPS.with(|q| q.borrow_mut().clear());
        }
    } else if result.is_err() {
        // Don't leave half-built ops for the outer drain
        SWIZZLE_OPS.with(|q| q.borrow_mut().truncate(s_mark));
        INIT_OPS.with(|q| q.borrow_mut().truncate(i_mark));
    }
    result
}

///// ATTR OPERATIONS

fn collect_key(ks: &mut Vec<String>, k: &str) {
    if !ks.iter().any(|existing| existing == k) {
        ks.push(k.to_owned());
    }
}

fn ser_collect_keys(trav: &Traversal, ks: &mut Vec<String>) -> Result<()> {
    let desc = trav.desc;
    if let Some(acr) = desc.keys.as_ref() {
        let keys_ty = acr.to_type(Some(trav.item));
        unsafe {
            acr.access(AccessOp::Read, trav.item, &mut |p| {
                if keys_ty == Type::of::<Vec<String>>() {
                    for k in &*(p as *const Vec<String>) {
                        collect_key(ks, k);
                    }
                    Ok(())
                } else {
                    // General case: any type serializing to an array of
                    // strings
                    let keys_ref: Reference =
                        Pointer::raw(keys_ty.add_readonly(), p).into();
                    let tree =
                        item_to_tree(&keys_ref, &Location::empty())?;
                    let invalid = || Error::InvalidKeysType {
                        location: trav_location(trav),
                        type_name: keys_ty.name().to_owned(),
                    };
                    let a = <&[Tree]>::try_from(&tree)
                        .map_err(|_| invalid())?;
                    for e in a {
                        let k = <&str>::try_from(e)
                            .map_err(|_| invalid())?;
                        collect_key(ks, k);
                    }
                    Ok(())
                }
            })
        }
    } else if let Some(attrs) = desc.attrs.as_ref() {
        for attr in attrs {
            if attr.include {
                // Keys of an included attr merge into the parent
                trav_attr(
                    trav,
                    &attr.acr,
                    &attr.key,
                    AccessOp::Read,
                    &mut |child| ser_collect_keys(child, ks),
                )?;
            } else {
                collect_key(ks, &attr.key);
            }
        }
        Ok(())
    } else if let Some(acr) = desc.delegate.as_ref() {
        trav_delegate(trav, acr, AccessOp::Read, &mut |child| {
            ser_collect_keys(child, ks)
        })
    } else {
        Err(Error::NoAttrs {
            location: trav_location(trav),
        })
    }
}

fn claim_key(ks: &mut Vec<String>, k: &str) -> bool {
    if let Some(i) = ks.iter().position(|existing| existing == k) {
        ks.remove(i);
        true
    } else {
        false
    }
}

fn ser_claim_keys(
    trav: &Traversal,
    ks: &mut Vec<String>,
    mut optional: bool,
) -> Result<()> {
    let desc = trav.desc;
    if let Some(acr) = desc.keys.as_ref() {
        let keys_ty = acr.to_type(Some(trav.item));
        if !acr.readonly {
            let supplied = std::mem::take(ks);
            unsafe {
                acr.access(AccessOp::Write, trav.item, &mut |p| {
                    if keys_ty == Type::of::<Vec<String>>() {
                        *(p as *mut Vec<String>) = supplied.clone();
                        Ok(())
                    } else {
                        // General case: deserialize the key list into
                        // whatever type the accessor wants
                        let a: Vec<Tree> = supplied
                            .iter()
                            .map(|k| Tree::from(k.clone()))
                            .collect();
                        let keys_ref: Reference =
                            Pointer::raw(keys_ty, p).into();
                        item_from_tree(
                            &keys_ref,
                            &Tree::from(a),
                            &Location::empty(),
                            false,
                        )
                    }
                })
            }
        } else {
            // Readonly keys: the supplied keys must exactly match the
            // computed keys
            let mut computed = Vec::new();
            ser_collect_keys(trav, &mut computed)?;
            for k in computed {
                if claim_key(ks, &k) {
                    optional = false;
                } else if !optional {
                    return Err(Error::MissingAttr {
                        location: trav_location(trav),
                        key: k,
                    });
                }
            }
            Ok(())
        }
    } else if let Some(attrs) = desc.attrs.as_ref() {
        // If any of this item's attrs are given, all required attrs must
        // be given (matters when this item is an optional included attr)
        if attrs.iter().any(|a| ks.iter().any(|k| *k == a.key)) {
            optional = false;
        }
        let mut claimed_include = vec![false; attrs.len()];
        for (i, attr) in attrs.iter().enumerate() {
            if claim_key(ks, &attr.key) {
                if attr.include {
                    claimed_include[i] = true;
                }
            } else if optional || attr.optional || attr.include {
                // May be omitted
            } else {
                return Err(Error::MissingAttr {
                    location: trav_location(trav),
                    key: attr.key.clone(),
                });
            }
        }
        // Included attrs that weren't given uncollapsed claim their keys
        // from the parent's namespace
        for (i, attr) in attrs.iter().enumerate() {
            if attr.include && !claimed_include[i] {
                trav_attr(
                    trav,
                    &attr.acr,
                    &attr.key,
                    AccessOp::Write,
                    &mut |child| {
                        ser_claim_keys(
                            child,
                            ks,
                            optional || attr.optional,
                        )
                    },
                )?;
            }
        }
        Ok(())
    } else if let Some(acr) = desc.delegate.as_ref() {
        trav_delegate(trav, acr, AccessOp::Write, &mut |child| {
            ser_claim_keys(child, ks, optional)
        })
    } else {
        Err(Error::NoAttrs {
            location: trav_location(trav),
        })
    }
}

fn ser_set_keys(trav: &Traversal, mut ks: Vec<String>) -> Result<()> {
    ser_claim_keys(trav, &mut ks, false)?;
    if let Some(k) = ks.into_iter().next() {
        return Err(Error::UnwantedAttr {
            location: trav_location(trav),
            key: k,
        });
    }
    Ok(())
}

/// Returns false without calling the callback if the attr isn't found.
fn ser_maybe_attr(
    trav: &Traversal,
    key: &str,
    op: AccessOp,
    cb: TravCb,
) -> Result<bool> {
    let desc = trav.desc;
    if let Some(attrs) = desc.attrs.as_ref() {
        // Direct attrs first
        for attr in attrs {
            if attr.key == key {
                trav_attr(trav, &attr.acr, key, op, cb)?;
                return Ok(true);
            }
        }
        // Then the attrs of included attrs.  Writes pass modify to the
        // including accessor so its sibling attrs are preserved.
        for attr in attrs {
            if attr.include {
                let include_op = if op == AccessOp::Write {
                    AccessOp::Modify
                } else {
                    op
                };
                let mut found = false;
                trav_attr(
                    trav,
                    &attr.acr,
                    &attr.key,
                    include_op,
                    &mut |child| {
                        found =
                            ser_maybe_attr(child, key, op, &mut *cb)?;
                        Ok(())
                    },
                )?;
                if found {
                    return Ok(true);
                }
            }
        }
    }
    if let Some(f) = desc.attr_fn() {
        if let Some(r) = f(trav.item, key) {
            trav_attr_func(trav, &r, f, key, op, cb)?;
            return Ok(true);
        }
    }
    if desc.accepts_object() {
        // This item supports attributes but doesn't have this one; don't
        // fall back to the delegate
        return Ok(false);
    }
    if let Some(acr) = desc.delegate.as_ref() {
        let del_op = if op == AccessOp::Write {
            AccessOp::Modify
        } else {
            op
        };
        let mut found = false;
        trav_delegate(trav, acr, del_op, &mut |child| {
            found = ser_maybe_attr(child, key, op, &mut *cb)?;
            Ok(())
        })?;
        return Ok(found);
    }
    Err(Error::NoAttrs {
        location: trav_location(trav),
    })
}

fn ser_attr(
    trav: &Traversal,
    key: &str,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    if ser_maybe_attr(trav, key, op, cb)? {
        Ok(())
    } else {
        Err(Error::AttrNotFound {
            location: trav_location(trav),
            key: key.to_owned(),
        })
    }
}

///// ELEM OPERATIONS

fn ser_get_length(trav: &Traversal) -> Result<usize> {
    let desc = trav.desc;
    if let Some(acr) = desc.length.as_ref() {
        let mut len = 0usize;
        unsafe {
            acr.access(AccessOp::Read, trav.item, &mut |p| {
                len = *(p as *const usize);
                Ok(())
            })?;
        }
        Ok(len)
    } else if let Some(elems) = desc.elems.as_ref() {
        Ok(elems.len())
    } else if let Some(acr) = desc.delegate.as_ref() {
        let mut len = 0;
        trav_delegate(trav, acr, AccessOp::Read, &mut |child| {
            len = ser_get_length(child)?;
            Ok(())
        })?;
        Ok(len)
    } else {
        Err(Error::NoElems {
            location: trav_location(trav),
        })
    }
}

fn ser_set_length(trav: &Traversal, len: usize) -> Result<()> {
    let desc = trav.desc;
    if let Some(acr) = desc.length.as_ref() {
        if !acr.readonly {
            unsafe {
                acr.access(AccessOp::Write, trav.item, &mut |p| {
                    *(p as *mut usize) = len;
                    Ok(())
                })
            }
        } else {
            // For a readonly length, just check the provided length
            let expected = ser_get_length(trav)?;
            if len != expected {
                return Err(Error::WrongLength {
                    location: trav_location(trav),
                    min: expected,
                    max: expected,
                    got: len,
                });
            }
            Ok(())
        }
    } else if let Some(elems) = desc.elems.as_ref() {
        let max = elems.len();
        let mut min = max;
        while min > 0 && elems[min - 1].optional {
            min -= 1;
        }
        if len < min || len > max {
            return Err(Error::WrongLength {
                location: trav_location(trav),
                min,
                max,
                got: len,
            });
        }
        Ok(())
    } else if let Some(acr) = desc.delegate.as_ref() {
        trav_delegate(trav, acr, AccessOp::Write, &mut |child| {
            ser_set_length(child, len)
        })
    } else {
        Err(Error::NoElems {
            location: trav_location(trav),
        })
    }
}

/// Returns false without calling the callback if the elem is out of range.
fn ser_maybe_elem(
    trav: &Traversal,
    index: usize,
    op: AccessOp,
    cb: TravCb,
) -> Result<bool> {
    let desc = trav.desc;
    if let Some(elems) = desc.elems.as_ref() {
        if let Some(elem) = elems.get(index) {
            trav_elem(trav, &elem.acr, index, op, cb)?;
            return Ok(true);
        }
        // Out of bounds; fall through to elem_func
    }
    if let Some(f) = desc.elem_fn() {
        if let Some(r) = f(trav.item, index) {
            trav_elem_func(trav, &r, f, index, op, cb)?;
            return Ok(true);
        }
    }
    if desc.accepts_array() {
        return Ok(false);
    }
    if let Some(acr) = desc.delegate.as_ref() {
        let del_op = if op == AccessOp::Write {
            AccessOp::Modify
        } else {
            op
        };
        let mut found = false;
        trav_delegate(trav, acr, del_op, &mut |child| {
            found = ser_maybe_elem(child, index, op, &mut *cb)?;
            Ok(())
        })?;
        return Ok(found);
    }
    Err(Error::NoElems {
        location: trav_location(trav),
    })
}

fn ser_elem(
    trav: &Traversal,
    index: usize,
    op: AccessOp,
    cb: TravCb,
) -> Result<()> {
    if ser_maybe_elem(trav, index, op, cb)? {
        Ok(())
    } else {
        Err(Error::ElemNotFound {
            location: trav_location(trav),
            index,
        })
    }
}

///// PUBLIC ACCESS OPERATIONS

/// The keys of an object-like item.
pub fn item_get_keys(item: &Reference) -> Result<Vec<String>> {
    let mut ks = Vec::new();
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Read,
        &mut |trav| ser_collect_keys(trav, &mut ks),
    )?;
    Ok(ks)
}

/// Set the keys of an object-like item.  May clear its contents.
pub fn item_set_keys(item: &Reference, ks: &[String]) -> Result<()> {
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Write,
        &mut |trav| ser_set_keys(trav, ks.to_vec()),
    )
}

/// An attribute of an object-like item, or None if there is no such key.
pub fn item_maybe_attr(
    item: &Reference,
    key: &str,
) -> Result<Option<Reference>> {
    let mut r = None;
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Read,
        &mut |trav| {
            ser_maybe_attr(trav, key, AccessOp::Read, &mut |child| {
                r = Some(trav_reference(child));
                Ok(())
            })?;
            Ok(())
        },
    )?;
    Ok(r)
}

pub fn item_attr(item: &Reference, key: &str) -> Result<Reference> {
    item_maybe_attr(item, key)?.ok_or_else(|| Error::AttrNotFound {
        location: Location::empty(),
        key: key.to_owned(),
    })
}

/// The length of an array-like item.
pub fn item_get_length(item: &Reference) -> Result<usize> {
    let mut len = 0;
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Read,
        &mut |trav| {
            len = ser_get_length(trav)?;
            Ok(())
        },
    )?;
    Ok(len)
}

/// Set the length of an array-like item.  May clear some of its contents.
pub fn item_set_length(item: &Reference, len: usize) -> Result<()> {
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Write,
        &mut |trav| ser_set_length(trav, len),
    )
}

/// An element of an array-like item, or None if out of range.
pub fn item_maybe_elem(
    item: &Reference,
    index: usize,
) -> Result<Option<Reference>> {
    let mut r = None;
    trav_start(
        item,
        &Location::empty(),
        AccessOp::Read,
        &mut |trav| {
            ser_maybe_elem(trav, index, AccessOp::Read, &mut |child| {
                r = Some(trav_reference(child));
                Ok(())
            })?;
            Ok(())
        },
    )?;
    Ok(r)
}

pub fn item_elem(item: &Reference, index: usize) -> Result<Reference> {
    item_maybe_elem(item, index)?.ok_or_else(|| Error::ElemNotFound {
        location: Location::empty(),
        index,
    })
}

///// SHORTCUTS

pub fn item_to_string(
    item: &Reference,
    opts: PrintOptions,
) -> Result<String> {
    Ok(tree_to_string(
        &item_to_tree(item, &Location::empty())?,
        opts,
    ))
}

pub fn item_from_string(item: &Reference, src: &str) -> Result<()> {
    item_from_tree(
        item,
        &tree_from_string(src)?,
        &Location::empty(),
        false,
    )
}

pub fn item_to_file(
    item: &Reference,
    path: impl AsRef<Path>,
    opts: PrintOptions,
) -> Result<()> {
    crate::print::tree_to_file(
        &item_to_tree(item, &Location::empty())?,
        path,
        opts,
    )
}

pub fn item_from_file(
    item: &Reference,
    path: impl AsRef<Path>,
) -> Result<()> {
    item_from_tree(
        item,
        &crate::parse::tree_from_file(path)?,
        &Location::empty(),
        false,
    )
}

///// SCANNING

/// Visit the item and every sub-item reachable through the serialization
/// protocols, with its location.
pub(crate) fn recursive_scan(
    item: &Reference,
    loc: &Location,
    cb: &mut dyn FnMut(&Reference, &Location) -> Result<()>,
) -> Result<()> {
    if item.is_empty() {
        return Ok(());
    }
    cb(item, loc)?;
    let desc = item.type_of().require_description()?;
    match desc.preference() {
        Preference::Object => {
            for k in item_get_keys(item)? {
                let child = item_attr(item, &k)?;
                recursive_scan(&child, &loc.child_key(k), cb)?;
            }
            Ok(())
        }
        Preference::Array => {
            let len = item_get_length(item)?;
            for i in 0..len {
                let child = item_elem(item, i)?;
                recursive_scan(&child, &loc.child_index(i), cb)?;
            }
            Ok(())
        }
        Preference::Neither => {
            if let Some(acr) = desc.delegate.as_ref() {
                let child =
                    item.chain(crate::accessor::AcrRef::Static(acr));
                recursive_scan(&child, loc, cb)?;
            }
            Ok(())
        }
    }
}
