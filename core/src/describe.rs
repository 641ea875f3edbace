//! Describing types to AYU.
//!
//! A [`Description`] is the static metadata record for one host type: its
//! name and layout, construction/destruction thunks, and up to one of each
//! serialization facet (`to_tree`, `from_tree`, `swizzle`, `init`, `values`,
//! `attrs`, `elems`, `keys`, `attr_func`, `length`, `elem_func`,
//! `delegate`).  Types opt in by implementing [`Describe`] with a builder
//! chain:
//!
//! ```
//! use ayu::{Describe, Description, member};
//!
//! struct Window { width: u32, height: u32 }
//!
//! impl Describe for Window {
//!     fn describe() -> Description {
//!         Description::new::<Window>("Window")
//!             .attr("width", member!(Window, width))
//!             .attr("height", member!(Window, height))
//!             .finish()
//!     }
//! }
//! ```

use crate::accessor::{Accessor, AccessorFor, OwnedErased};
use crate::error::Result;
use crate::reference::Reference;
use crate::registry::Mu;
use crate::tree::Tree;
use std::any::TypeId;
use std::marker::PhantomData;
use std::ops::BitOr;

/// A type that has an AYU description.  Descriptions are built once per
/// process (lazily, the first time the type is used) and live forever.
///
/// `describe` must not call `Type::of::<Self>()`, directly or through an
/// eager accessor; the registry is mid-registration at that point.  Accessor
/// constructors defer their type lookups, so ordinary builders are safe.
pub trait Describe: Sized + 'static {
    fn describe() -> Description;
}

pub(crate) type ToTreeFn = Box<dyn Fn(*const Mu) -> Result<Tree>>;
pub(crate) type FromTreeFn = Box<dyn Fn(*mut Mu, &Tree) -> Result<()>>;
pub(crate) type SwizzleFn = Box<dyn Fn(*mut Mu, &Tree) -> Result<()>>;
pub(crate) type InitFn = Box<dyn Fn(*mut Mu) -> Result<()>>;
pub(crate) type AttrFnBox = Box<dyn Fn(*mut Mu, &str) -> Option<Reference>>;
pub(crate) type ElemFnBox =
    Box<dyn Fn(*mut Mu, usize) -> Option<Reference>>;

/// Flags for [`DescriptionBuilder::attr_with`] / `elem_with`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttrFlags {
    /// The attr may be missing from the tree.  There is no default-value
    /// support here; a default belongs in the type's Default impl.
    pub optional: bool,
    /// The attrs of this attr are flattened into the parent's namespace,
    /// and the parent can be cast to the attr's type.  This is how
    /// inheritance is spelled.
    pub include: bool,
}

pub const OPTIONAL: AttrFlags = AttrFlags {
    optional: true,
    include: false,
};
pub const INCLUDE: AttrFlags = AttrFlags {
    optional: false,
    include: true,
};

impl BitOr for AttrFlags {
    type Output = AttrFlags;
    fn bitor(self, other: AttrFlags) -> AttrFlags {
        AttrFlags {
            optional: self.optional || other.optional,
            include: self.include || other.include,
        }
    }
}

pub(crate) struct Attr {
    pub key: String,
    pub acr: Accessor,
    pub optional: bool,
    pub include: bool,
}

pub(crate) struct Elem {
    pub acr: Accessor,
    pub optional: bool,
    pub include: bool,
}

pub(crate) struct ValuesFacet {
    pub eq: Box<dyn Fn(*const Mu, *const Mu) -> bool>,
    pub assign: Box<dyn Fn(*mut Mu, *const Mu) -> Result<()>>,
    /// (form-tagged name, stored value)
    pub entries: Vec<(Tree, OwnedErased)>,
}

/// Whether an item prints as an object or an array when the choice is free:
/// whichever family of facets was declared first wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Preference {
    Neither,
    Object,
    Array,
}

pub struct Description {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) default_construct: Option<unsafe fn(*mut Mu)>,
    pub(crate) destroy: Option<unsafe fn(*mut Mu)>,
    pub(crate) to_tree: Option<ToTreeFn>,
    pub(crate) from_tree: Option<FromTreeFn>,
    pub(crate) swizzle: Option<SwizzleFn>,
    pub(crate) init: Option<InitFn>,
    pub(crate) values: Option<ValuesFacet>,
    pub(crate) attrs: Option<Vec<Attr>>,
    pub(crate) elems: Option<Vec<Elem>>,
    pub(crate) keys: Option<Accessor>,
    pub(crate) attr_func: Option<AttrFnBox>,
    pub(crate) length: Option<Accessor>,
    pub(crate) elem_func: Option<ElemFnBox>,
    pub(crate) delegate: Option<Accessor>,
    pub(crate) preference: Preference,
}

impl Description {
    /// Start describing `T` under the given display name.
    pub fn new<T: 'static>(name: &str) -> DescriptionBuilder<T> {
        unsafe fn drop_thunk<T>(p: *mut Mu) {
            std::ptr::drop_in_place(p as *mut T)
        }
        DescriptionBuilder {
            d: Description {
                name: name.to_owned(),
                type_id: TypeId::of::<T>(),
                size: std::mem::size_of::<T>(),
                align: std::mem::align_of::<T>(),
                default_construct: None,
                destroy: Some(drop_thunk::<T>),
                to_tree: None,
                from_tree: None,
                swizzle: None,
                init: None,
                values: None,
                attrs: None,
                elems: None,
                keys: None,
                attr_func: None,
                length: None,
                elem_func: None,
                delegate: None,
                preference: Preference::Neither,
            },
            _host: PhantomData,
        }
    }

    pub(crate) fn accepts_object(&self) -> bool {
        self.attrs.is_some() || self.keys.is_some()
    }

    pub(crate) fn accepts_array(&self) -> bool {
        self.elems.is_some() || self.length.is_some()
    }

    pub(crate) fn preference(&self) -> Preference {
        self.preference
    }

    /// Accessors that casts may traverse: the delegate plus include-flagged
    /// attrs and elems.
    pub(crate) fn cast_accessors(
        &self,
    ) -> impl Iterator<Item = &Accessor> {
        self.delegate
            .iter()
            .chain(
                self.attrs
                    .iter()
                    .flatten()
                    .filter(|a| a.include)
                    .map(|a| &a.acr),
            )
            .chain(
                self.elems
                    .iter()
                    .flatten()
                    .filter(|e| e.include)
                    .map(|e| &e.acr),
            )
    }

    pub(crate) fn attr_fn(
        &'static self,
    ) -> Option<crate::accessor::AttrFnPtr> {
        self.attr_func.as_ref().map(|b| &**b as crate::accessor::AttrFnPtr)
    }

    pub(crate) fn elem_fn(
        &'static self,
    ) -> Option<crate::accessor::ElemFnPtr> {
        self.elem_func.as_ref().map(|b| &**b as crate::accessor::ElemFnPtr)
    }
}

pub struct DescriptionBuilder<T> {
    d: Description,
    _host: PhantomData<fn(T)>,
}

impl<T: 'static> DescriptionBuilder<T> {
    /// Enable default construction for this type (used when building values
    /// from trees without an existing instance, e.g. resource loading).
    pub fn default_constructible(mut self) -> Self
    where
        T: Default,
    {
        unsafe fn construct_thunk<T: Default>(p: *mut Mu) {
            std::ptr::write(p as *mut T, T::default())
        }
        self.d.default_construct = Some(construct_thunk::<T>);
        self
    }

    /// Drop the destroy thunk, making the type refuse dynamic construction
    /// and destruction entirely.
    pub fn no_destroy(mut self) -> Self {
        self.d.destroy = None;
        self
    }

    pub fn to_tree(mut self, f: fn(&T) -> Result<Tree>) -> Self {
        assert!(self.d.to_tree.is_none(), "multiple to_tree facets");
        self.d.to_tree =
            Some(Box::new(move |p| f(unsafe { &*(p as *const T) })));
        self
    }

    pub fn from_tree(mut self, f: fn(&mut T, &Tree) -> Result<()>) -> Self {
        assert!(self.d.from_tree.is_none(), "multiple from_tree facets");
        self.d.from_tree = Some(Box::new(move |p, t| {
            f(unsafe { &mut *(p as *mut T) }, t)
        }));
        self
    }

    /// Post-construction fixup that runs after all peer items have been
    /// structurally built.  Used for resolving references.
    pub fn swizzle(mut self, f: fn(&mut T, &Tree) -> Result<()>) -> Self {
        assert!(self.d.swizzle.is_none(), "multiple swizzle facets");
        self.d.swizzle = Some(Box::new(move |p, t| {
            f(unsafe { &mut *(p as *mut T) }, t)
        }));
        self
    }

    /// Runs after swizzling is done for the whole tree.
    pub fn init(mut self, f: fn(&mut T) -> Result<()>) -> Self {
        assert!(self.d.init.is_none(), "multiple init facets");
        self.d.init =
            Some(Box::new(move |p| f(unsafe { &mut *(p as *mut T) })));
        self
    }

    /// Add a named value: an item equal to `v` serializes as `name`, and
    /// parsing `name` assigns `v`.
    pub fn value(mut self, name: impl Into<Tree>, v: T) -> Self
    where
        T: PartialEq + Clone,
    {
        if self.d.values.is_none() {
            self.d.values = Some(ValuesFacet {
                eq: Box::new(|a, b| unsafe {
                    *(a as *const T) == *(b as *const T)
                }),
                assign: Box::new(|a, b| {
                    unsafe {
                        (*(a as *mut T)).clone_from(&*(b as *const T));
                    }
                    Ok(())
                }),
                entries: Vec::new(),
            });
        }
        self.d
            .values
            .as_mut()
            .unwrap()
            .entries
            .push((name.into(), OwnedErased::new(v)));
        self
    }

    /// Install custom equality and assignment for named values, for types
    /// that are not PartialEq + Clone.  Add entries with [`Self::custom_value`].
    pub fn values_custom(
        mut self,
        eq: fn(&T, &T) -> bool,
        assign: fn(&mut T, &T) -> Result<()>,
    ) -> Self {
        assert!(self.d.values.is_none(), "multiple values facets");
        self.d.values = Some(ValuesFacet {
            eq: Box::new(move |a, b| unsafe {
                eq(&*(a as *const T), &*(b as *const T))
            }),
            assign: Box::new(move |a, b| unsafe {
                assign(&mut *(a as *mut T), &*(b as *const T))
            }),
            entries: Vec::new(),
        });
        self
    }

    /// Add a named value to a `values_custom` facet.
    pub fn custom_value(mut self, name: impl Into<Tree>, v: T) -> Self {
        let values = self
            .d
            .values
            .as_mut()
            .expect("custom_value requires values_custom first");
        values.entries.push((name.into(), OwnedErased::new(v)));
        self
    }

    pub fn attr(self, key: &str, acr: AccessorFor<T>) -> Self {
        self.attr_with(key, acr, AttrFlags::default())
    }

    pub fn attr_with(
        mut self,
        key: &str,
        acr: AccessorFor<T>,
        flags: AttrFlags,
    ) -> Self {
        if self.d.preference == Preference::Neither {
            self.d.preference = Preference::Object;
        }
        self.d.attrs.get_or_insert_with(Vec::new).push(Attr {
            key: key.to_owned(),
            acr: acr.erase(),
            optional: flags.optional,
            include: flags.include,
        });
        self
    }

    pub fn elem(self, acr: AccessorFor<T>) -> Self {
        self.elem_with(acr, AttrFlags::default())
    }

    pub fn elem_with(
        mut self,
        acr: AccessorFor<T>,
        flags: AttrFlags,
    ) -> Self {
        if self.d.preference == Preference::Neither {
            self.d.preference = Preference::Array;
        }
        self.d.elems.get_or_insert_with(Vec::new).push(Elem {
            acr: acr.erase(),
            optional: flags.optional,
            include: flags.include,
        });
        self
    }

    /// Dynamic object support: the accessor reads and writes the ordered
    /// list of currently-valid attr keys.  Must be paired with `attr_func`.
    pub fn keys(mut self, acr: AccessorFor<T>) -> Self {
        assert!(self.d.keys.is_none(), "multiple keys facets");
        if self.d.preference == Preference::Neither {
            self.d.preference = Preference::Object;
        }
        self.d.keys = Some(acr.erase());
        self
    }

    /// Dynamic attr lookup; None means "no such key".
    pub fn attr_func(
        mut self,
        f: fn(&mut T, &str) -> Option<Reference>,
    ) -> Self {
        assert!(self.d.attr_func.is_none(), "multiple attr_func facets");
        self.d.attr_func = Some(Box::new(move |p, key| {
            f(unsafe { &mut *(p as *mut T) }, key)
        }));
        self
    }

    /// Dynamic array support: the accessor reads and writes the length.
    /// Must be paired with `elem_func`.
    pub fn length(mut self, acr: AccessorFor<T>) -> Self {
        assert!(self.d.length.is_none(), "multiple length facets");
        if self.d.preference == Preference::Neither {
            self.d.preference = Preference::Array;
        }
        self.d.length = Some(acr.erase());
        self
    }

    /// Dynamic elem lookup; None means "out of range".
    pub fn elem_func(
        mut self,
        f: fn(&mut T, usize) -> Option<Reference>,
    ) -> Self {
        assert!(self.d.elem_func.is_none(), "multiple elem_func facets");
        self.d.elem_func = Some(Box::new(move |p, index| {
            f(unsafe { &mut *(p as *mut T) }, index)
        }));
        self
    }

    /// The item behaves for serialization exactly like the pointed-to
    /// sub-item.
    pub fn delegate(mut self, acr: AccessorFor<T>) -> Self {
        assert!(self.d.delegate.is_none(), "multiple delegate facets");
        self.d.delegate = Some(acr.erase());
        self
    }

    pub fn finish(self) -> Description {
        if let Some(elems) = &self.d.elems {
            // Optional elems must all trail the required ones; anything
            // else would shift the apparent index of later required elems
            let mut seen_optional = false;
            for e in elems {
                if e.optional {
                    seen_optional = true;
                } else {
                    assert!(
                        !seen_optional,
                        "required elem after optional elem in description \
                         for {}",
                        self.d.name
                    );
                }
            }
        }
        self.d
    }
}
