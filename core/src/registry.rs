//! Type identities and the description registry.
//!
//! A [`Type`] is a stable identity for a described host type: a pointer to
//! its leaked [`Description`] plus a readonly bit.  Descriptions are
//! registered lazily the first time [`Type::of`] is called for a type, and
//! are immutable and allocation-stable from then on.  The registry itself is
//! thread-local, like all of this crate's mutable global state.

use crate::describe::{Describe, Description};
use crate::error::{Error, Result};
use std::alloc;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// An opaque stand-in for a value of erased type.  All type-erased item
/// pointers in this crate are `*mut Mu`.
#[repr(C)]
pub struct Mu {
    _opaque: [u8; 0],
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, &'static Description>,
    by_name: HashMap<String, &'static Description>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// A described type.  Cheap to copy and compare; two Types are equal iff
/// they refer to the same description and have the same readonly bit.  The
/// empty Type is only good for equality tests and `is_empty`.
#[derive(Clone, Copy)]
pub struct Type {
    pub(crate) desc: Option<&'static Description>,
    pub(crate) readonly: bool,
}

impl Default for Type {
    fn default() -> Type {
        Type::empty()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        self.readonly == other.readonly
            && match (self.desc, other.desc) {
                (Some(a), Some(b)) => std::ptr::eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}
impl Eq for Type {}

impl std::hash::Hash for Type {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.desc
            .map(|d| d as *const Description)
            .unwrap_or(std::ptr::null())
            .hash(state);
        self.readonly.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.readonly {
            write!(f, "Type(readonly {})", self.name())
        } else {
            write!(f, "Type({})", self.name())
        }
    }
}

impl Type {
    pub fn empty() -> Type {
        Type {
            desc: None,
            readonly: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.desc.is_none()
    }

    /// The Type of `T`, registering `T`'s description on first use.
    pub fn of<T: Describe>() -> Type {
        let found = REGISTRY
            .with(|r| r.borrow().by_type.get(&TypeId::of::<T>()).copied());
        if let Some(desc) = found {
            return Type {
                desc: Some(desc),
                readonly: false,
            };
        }
        // Build outside the borrow; describe() may register other types
        let desc = T::describe();
        assert_eq!(
            desc.type_id,
            TypeId::of::<T>(),
            "description for {} was built for a different type",
            desc.name
        );
        REGISTRY.with(|r| {
            let mut r = r.borrow_mut();
            if let Some(existing) = r.by_type.get(&TypeId::of::<T>()) {
                return Type {
                    desc: Some(existing),
                    readonly: false,
                };
            }
            let leaked: &'static Description = Box::leak(Box::new(desc));
            r.by_type.insert(TypeId::of::<T>(), leaked);
            r.by_name.entry(leaked.name.clone()).or_insert(leaked);
            Type {
                desc: Some(leaked),
                readonly: false,
            }
        })
    }

    /// Look up a type by its registered name.  Only types that have been
    /// registered (via [`Type::of`] or [`crate::register`]) are found.
    pub fn from_name(name: &str) -> Result<Type> {
        REGISTRY
            .with(|r| r.borrow().by_name.get(name).copied())
            .map(|desc| Type {
                desc: Some(desc),
                readonly: false,
            })
            .ok_or_else(|| Error::TypeNotFound {
                name: name.to_owned(),
            })
    }

    pub(crate) fn from_description(
        desc: &'static Description,
        readonly: bool,
    ) -> Type {
        Type {
            desc: Some(desc),
            readonly,
        }
    }

    pub(crate) fn description(&self) -> Option<&'static Description> {
        self.desc
    }

    pub(crate) fn require_description(
        &self,
    ) -> Result<&'static Description> {
        self.desc.ok_or_else(|| Error::UnknownType {
            type_name: "(empty Type)".into(),
        })
    }

    pub fn name(&self) -> &str {
        self.desc.map(|d| d.name.as_str()).unwrap_or("(empty Type)")
    }

    pub fn size(&self) -> usize {
        self.desc.map(|d| d.size).unwrap_or(0)
    }

    pub fn align(&self) -> usize {
        self.desc.map(|d| d.align).unwrap_or(1)
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn add_readonly(mut self) -> Type {
        self.readonly = true;
        self
    }

    pub fn remove_readonly(mut self) -> Type {
        self.readonly = false;
        self
    }

    ///// CONSTRUCTION AND DESTRUCTION

    /// Construct an instance in place.  The target must have this type's
    /// size and alignment.  Refuses to construct values that could not be
    /// destroyed again.
    ///
    /// # Safety
    /// `target` must be valid, properly aligned, uninitialized storage.
    pub unsafe fn default_construct(&self, target: *mut Mu) -> Result<()> {
        let desc = self.require_description()?;
        if desc.destroy.is_none() {
            return Err(Error::CannotDestroy {
                type_name: desc.name.clone(),
            });
        }
        let construct = desc.default_construct.ok_or_else(|| {
            Error::CannotDefaultConstruct {
                type_name: desc.name.clone(),
            }
        })?;
        construct(target);
        Ok(())
    }

    /// Run the destructor in place.  The storage is not deallocated.
    ///
    /// # Safety
    /// `item` must point to a valid, initialized value of this type.
    pub unsafe fn destroy(&self, item: *mut Mu) -> Result<()> {
        let desc = self.require_description()?;
        let destroy = desc.destroy.ok_or_else(|| Error::CannotDestroy {
            type_name: desc.name.clone(),
        })?;
        destroy(item);
        Ok(())
    }

    /// Allocate uninitialized storage suitable for an instance of this type.
    /// Pair with [`Type::deallocate`].
    pub fn allocate(&self) -> *mut Mu {
        let size = self.size();
        let align = self.align();
        if size == 0 {
            return align as *mut Mu;
        }
        let layout = alloc::Layout::from_size_align(size, align)
            .expect("bad description layout");
        let p = unsafe { alloc::alloc(layout) };
        if p.is_null() {
            alloc::handle_alloc_error(layout);
        }
        p as *mut Mu
    }

    /// Free storage previously returned by [`Type::allocate`].
    ///
    /// # Safety
    /// `p` must have come from `allocate` on this same type and must not
    /// hold a live value.
    pub unsafe fn deallocate(&self, p: *mut Mu) {
        let size = self.size();
        if size == 0 {
            return;
        }
        let layout =
            alloc::Layout::from_size_align(size, self.align()).unwrap();
        alloc::dealloc(p as *mut u8, layout);
    }

    /// Allocate and default-construct an instance of this type.
    pub fn default_new(&self) -> Result<*mut Mu> {
        // Fail before allocating
        let desc = self.require_description()?;
        if desc.default_construct.is_none() {
            return Err(Error::CannotDefaultConstruct {
                type_name: desc.name.clone(),
            });
        }
        if desc.destroy.is_none() {
            return Err(Error::CannotDestroy {
                type_name: desc.name.clone(),
            });
        }
        let p = self.allocate();
        unsafe { self.default_construct(p)? };
        Ok(p)
    }

    /// Destroy and deallocate an instance previously made by `default_new`
    /// (or allocated compatibly).
    ///
    /// # Safety
    /// `p` must point to a valid value of this type in storage allocated
    /// with this type's layout.
    pub unsafe fn delete(&self, p: *mut Mu) -> Result<()> {
        self.destroy(p)?;
        self.deallocate(p);
        Ok(())
    }

    ///// CASTS
    // Casting scans the description's delegate and include-flagged
    // attr/elem accessors.  Upcasts (toward the base) follow any accessor
    // with an address; downcasts (toward the derived type) may only follow
    // accessors with an inverse address.  Casting non-readonly to readonly
    // is allowed, but never the reverse in the up direction; downcasts may
    // silently drop readonly.

    /// # Safety
    /// `p` must point to a valid value of this type.
    pub unsafe fn try_upcast_to(
        &self,
        to: Type,
        p: *mut Mu,
    ) -> Option<*mut Mu> {
        if let (Some(a), Some(b)) = (self.desc, to.desc) {
            if std::ptr::eq(a, b) {
                // Cannot remove readonly by upcasting
                if self.readonly && !to.readonly {
                    return None;
                }
                return Some(p);
            }
        } else {
            return None;
        }
        let desc = self.desc?;
        for acr in desc.cast_accessors() {
            let addr = unsafe { acr.address(p) };
            let Some(addr) = addr else { continue };
            let mut mid = acr.to_type(Some(p));
            if self.readonly || acr.readonly {
                mid = mid.add_readonly();
            }
            if let Some(r) = unsafe { mid.try_upcast_to(to, addr) } {
                return Some(r);
            }
        }
        None
    }

    /// # Safety
    /// See [`Type::try_upcast_to`].
    pub unsafe fn upcast_to(&self, to: Type, p: *mut Mu) -> Result<*mut Mu> {
        unsafe { self.try_upcast_to(to, p) }.ok_or_else(|| {
            Error::CannotCoerce {
                from: self.name().to_owned(),
                to: to.name().to_owned(),
            }
        })
    }

    /// # Safety
    /// `p` must point to a valid value of this type which really is the
    /// named sub-object of a value of type `to`.
    pub unsafe fn try_downcast_to(
        &self,
        to: Type,
        p: *mut Mu,
    ) -> Option<*mut Mu> {
        if let (Some(a), Some(b)) = (self.desc, to.desc) {
            if std::ptr::eq(a, b) {
                // Downcasting may drop readonly
                return Some(p);
            }
        } else {
            return None;
        }
        let to_desc = to.desc?;
        for acr in to_desc.cast_accessors() {
            if !acr.has_inverse_address() {
                continue;
            }
            let mid = acr.to_type(None);
            if let Some(q) = unsafe { self.try_downcast_to(mid, p) } {
                if let Some(r) = unsafe { acr.inverse_address(q) } {
                    return Some(r);
                }
            }
        }
        None
    }

    /// # Safety
    /// See [`Type::try_downcast_to`].
    pub unsafe fn downcast_to (
        &self,
        to: Type,
        p: *mut Mu,
    ) -> Result<*mut Mu> {
        unsafe { self.try_downcast_to(to, p) }.ok_or_else(|| {
            Error::CannotCoerce {
                from: self.name().to_owned(),
                to: to.name().to_owned(),
            }
        })
    }

    /// Try an upcast, then a downcast.
    ///
    /// # Safety
    /// See [`Type::try_upcast_to`] and [`Type::try_downcast_to`].
    pub unsafe fn try_cast_to(
        &self,
        to: Type,
        p: *mut Mu,
    ) -> Option<*mut Mu> {
        unsafe {
            self.try_upcast_to(to, p)
                .or_else(|| self.try_downcast_to(to, p))
        }
    }

    /// # Safety
    /// See [`Type::try_cast_to`].
    pub unsafe fn cast_to(&self, to: Type, p: *mut Mu) -> Result<*mut Mu> {
        unsafe { self.try_cast_to(to, p) }.ok_or_else(|| {
            Error::CannotCoerce {
                from: self.name().to_owned(),
                to: to.name().to_owned(),
            }
        })
    }
}

/// Eagerly register a type's description so it can be found by name (e.g.
/// when it appears as a resource's top-level type in a file).
pub fn register<T: Describe>() {
    let _ = Type::of::<T>();
}
