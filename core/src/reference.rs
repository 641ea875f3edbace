//! A Reference points to an item of any described type, even one whose
//! address cannot be taken (an abstract property reachable only through
//! getters and setters, say).
//!
//! A Reference is a host pointer plus an optional accessor chain projecting
//! from that host; no accessor means the identity projection.  Copying is
//! cheap.  Like a raw pointer, a Reference carries no lifetime: the host
//! (and anything its accessor chain borrows) must outlive every use of the
//! Reference, and that is the caller's responsibility.

use crate::accessor::{AccessCb, AccessOp, Accessor, AccessorFor, AcrRef, AttrFnPtr, ElemFnPtr};
use crate::describe::Describe;
use crate::dynamic::Pointer;
use crate::error::{Error, Result};
use crate::location::Location;
use crate::registry::{Mu, Type};
use crate::tree::Tree;
use std::rc::Rc;

#[derive(Clone, Default)]
pub struct Reference {
    pub(crate) host: Pointer,
    pub(crate) acr: Option<AcrRef>,
}

impl From<Pointer> for Reference {
    fn from(host: Pointer) -> Reference {
        Reference { host, acr: None }
    }
}

impl Reference {
    /// The empty Reference has no type and no value.
    pub fn empty() -> Reference {
        Reference::default()
    }

    /// A readonly reference to a typed value.
    pub fn to<T: Describe>(v: &T) -> Reference {
        Pointer::to(v).into()
    }

    /// A writable reference to a typed value.
    pub fn to_mut<T: Describe>(v: &mut T) -> Reference {
        Pointer::to_mut(v).into()
    }

    /// A reference through an explicit accessor, for use in `attr_func` and
    /// `elem_func` implementations.
    pub fn with_accessor<T: Describe>(
        host: &mut T,
        acr: AccessorFor<T>,
    ) -> Reference {
        Reference {
            host: Pointer::to_mut(host),
            acr: Some(AcrRef::Shared(Rc::new(acr.erase()))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// The type of the referred-to item (empty for the empty Reference).
    pub fn type_of(&self) -> Type {
        match &self.acr {
            Some(acr) => {
                let from = if self.host.is_null() {
                    None
                } else {
                    Some(self.host.address())
                };
                acr.to_type(from)
            }
            None => self.host.ty(),
        }
    }

    /// Writing through this reference fails if true.
    pub fn readonly(&self) -> bool {
        self.host.ty().readonly()
            || self.acr.as_ref().map(|a| a.readonly).unwrap_or(false)
    }

    /// A stable pointer to the item, or None if the accessor chain cannot
    /// guarantee one.
    pub fn address(&self) -> Option<*mut Mu> {
        if self.is_empty() {
            return None;
        }
        match &self.acr {
            Some(acr) => unsafe { acr.address(self.host.address()) },
            None => Some(self.host.address()),
        }
    }

    pub fn require_address(&self) -> Result<*mut Mu> {
        self.address().ok_or_else(|| Error::UnaddressableReference {
            location: Location::empty(),
            type_name: self.type_of().name().to_owned(),
        })
    }

    fn require_writeable(&self) -> Result<()> {
        if self.readonly() {
            Err(Error::WriteReadonlyReference {
                location: Location::empty(),
                type_name: self.type_of().name().to_owned(),
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn access(&self, op: AccessOp, cb: AccessCb) -> Result<()> {
        if self.is_empty() {
            return Err(Error::UnknownType {
                type_name: "(empty Reference)".into(),
            });
        }
        if op != AccessOp::Read {
            self.require_writeable()?;
        }
        match &self.acr {
            Some(acr) => unsafe {
                acr.access(op, self.host.address(), cb)
            },
            None => cb(self.host.address()),
        }
    }

    ///// TYPED ACCESS

    pub fn read_as<T: Describe, R>(
        &self,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let ty = self.type_of();
        let mut f = Some(f);
        let mut out = None;
        self.access(AccessOp::Read, &mut |p| {
            let tp = unsafe { ty.cast_to(Type::of::<T>(), p)? };
            let f = f.take().expect("read callback called twice");
            out = Some(f(unsafe { &*(tp as *const T) }));
            Ok(())
        })?;
        Ok(out.expect("accessor did not call the read callback"))
    }

    pub fn write_as<T: Describe, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let ty = self.type_of();
        let mut f = Some(f);
        let mut out = None;
        self.access(AccessOp::Write, &mut |p| {
            let tp = unsafe { ty.cast_to(Type::of::<T>(), p)? };
            let f = f.take().expect("write callback called twice");
            out = Some(f(unsafe { &mut *(tp as *mut T) }));
            Ok(())
        })?;
        Ok(out.expect("accessor did not call the write callback"))
    }

    pub fn modify_as<T: Describe, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let ty = self.type_of();
        let mut f = Some(f);
        let mut out = None;
        self.access(AccessOp::Modify, &mut |p| {
            let tp = unsafe { ty.cast_to(Type::of::<T>(), p)? };
            let f = f.take().expect("modify callback called twice");
            out = Some(f(unsafe { &mut *(tp as *mut T) }));
            Ok(())
        })?;
        Ok(out.expect("accessor did not call the modify callback"))
    }

    /// Copy the referenced value out.  Uses the address when there is one.
    pub fn get_as<T: Describe + Clone>(&self) -> Result<T> {
        if let Some(addr) = self.address() {
            let p = unsafe { self.type_of().cast_to(Type::of::<T>(), addr)? };
            Ok(unsafe { (*(p as *const T)).clone() })
        } else {
            self.read_as(|v: &T| v.clone())
        }
    }

    /// Assign to the referenced item.
    pub fn set_as<T: Describe>(&self, v: T) -> Result<()> {
        self.write_as(|t: &mut T| *t = v)
    }

    ///// CHAINING

    /// Project further through an accessor.  Cheap when this reference is
    /// addressable; otherwise builds a chain accessor.
    pub(crate) fn chain(&self, acr: AcrRef) -> Reference {
        if let Some(addr) = self.address() {
            let mut ty = self.type_of();
            if self.readonly() {
                ty = ty.add_readonly();
            }
            Reference {
                host: Pointer::raw(ty, addr),
                acr: Some(acr),
            }
        } else {
            let a = self
                .acr
                .clone()
                .expect("unaddressable reference with no accessor");
            Reference {
                host: self.host,
                acr: Some(AcrRef::Shared(Rc::new(Accessor::chain(a, acr)))),
            }
        }
    }

    pub(crate) fn chain_attr_func(
        &self,
        f: AttrFnPtr,
        key: &str,
    ) -> Reference {
        self.chain(AcrRef::Shared(Rc::new(Accessor::chain_attr_func(
            f,
            key.to_owned(),
        ))))
    }

    pub(crate) fn chain_elem_func(
        &self,
        f: ElemFnPtr,
        index: usize,
    ) -> Reference {
        self.chain(AcrRef::Shared(Rc::new(Accessor::chain_elem_func(
            f, index,
        ))))
    }

    ///// CASTS

    pub fn try_upcast_to(&self, to: Type) -> Option<Reference> {
        let addr = self.address()?;
        let p = unsafe { self.type_of().try_upcast_to(to, addr)? };
        Some(Pointer::raw(to, p).into())
    }

    pub fn try_downcast_to(&self, to: Type) -> Option<Reference> {
        let addr = self.address()?;
        let p = unsafe { self.type_of().try_downcast_to(to, addr)? };
        Some(Pointer::raw(to, p).into())
    }

    pub fn try_cast_to(&self, to: Type) -> Option<Reference> {
        self.try_upcast_to(to).or_else(|| self.try_downcast_to(to))
    }

    pub fn cast_to(&self, to: Type) -> Result<Reference> {
        self.try_cast_to(to).ok_or_else(|| Error::CannotCoerce {
            from: self.type_of().name().to_owned(),
            to: to.name().to_owned(),
        })
    }

    ///// SERIALIZATION SHORTCUTS

    pub fn to_tree(&self) -> Result<Tree> {
        crate::serialize::item_to_tree(self, &Location::empty())
    }

    pub fn from_tree(&self, tree: &Tree) -> Result<()> {
        crate::serialize::item_from_tree(
            self,
            tree,
            &Location::empty(),
            false,
        )
    }

    pub fn get_keys(&self) -> Result<Vec<String>> {
        crate::serialize::item_get_keys(self)
    }

    pub fn set_keys(&self, keys: &[String]) -> Result<()> {
        crate::serialize::item_set_keys(self, keys)
    }

    pub fn maybe_attr(&self, key: &str) -> Result<Option<Reference>> {
        crate::serialize::item_maybe_attr(self, key)
    }

    pub fn attr(&self, key: &str) -> Result<Reference> {
        crate::serialize::item_attr(self, key)
    }

    pub fn get_length(&self) -> Result<usize> {
        crate::serialize::item_get_length(self)
    }

    pub fn set_length(&self, len: usize) -> Result<()> {
        crate::serialize::item_set_length(self, len)
    }

    pub fn maybe_elem(&self, index: usize) -> Result<Option<Reference>> {
        crate::serialize::item_maybe_elem(self, index)
    }

    pub fn elem(&self, index: usize) -> Result<Reference> {
        crate::serialize::item_elem(self, index)
    }
}

// References compare equal if they share host and accessor, or if both are
// addressable with equal types and resolve to the same address.
// Unaddressable references built through attr_func/elem_func chains are not
// comparable (and thus not serializable); they are inefficient anyway, so
// avoid creating them where it matters.
impl PartialEq for Reference {
    fn eq(&self, other: &Reference) -> bool {
        if self.host.address() == other.host.address() {
            match (&self.acr, &other.acr) {
                (None, None) => {
                    if self.host.ty() == other.host.ty() {
                        return true;
                    }
                }
                (Some(a), Some(b)) => {
                    if a.as_ptr() == b.as_ptr() {
                        return true;
                    }
                }
                _ => {}
            }
        }
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.type_of() != other.type_of() {
            return false;
        }
        match (self.address(), other.address()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Reference {}

impl std::hash::Hash for Reference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if let Some(addr) = self.address() {
            1u8.hash(state);
            addr.hash(state);
            self.type_of().hash(state);
        } else {
            0u8.hash(state);
            self.host.address().hash(state);
            self.acr
                .as_ref()
                .map(|a| a.as_ptr())
                .unwrap_or(std::ptr::null())
                .hash(state);
        }
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Reference(empty)")
        } else {
            write!(f, "Reference({})", self.type_of().name())
        }
    }
}
