//! The accessor algebra: composable projections from a "from" value to a
//! "to" value.
//!
//! Every accessor supports the same four operations (type query, access with
//! read/write/modify, address, inverse address) so the traversal code can
//! treat them uniformly.  The set of kinds is a closed enum; the typed
//! constructor functions in this module erase the host and field types into
//! small thunks at construction time.

use crate::error::{Error, Result};
use crate::location::Location;
use crate::reference::Reference;
use crate::registry::{Mu, Type};
use crate::describe::Describe;
use std::ops::Deref;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AccessOp {
    /// Callback gets an immutable view, possibly of a temporary.
    Read,
    /// Callback gets a mutable view that is either the target or a
    /// default-constructed temporary.  Not writing may clear the target.
    Write,
    /// Callback gets the current value mutably; changes are written back.
    Modify,
}

pub(crate) type AccessCb<'c> = &'c mut dyn FnMut(*mut Mu) -> Result<()>;

pub(crate) type AttrFnPtr =
    &'static dyn Fn(*mut Mu, &str) -> Option<Reference>;
pub(crate) type ElemFnPtr =
    &'static dyn Fn(*mut Mu, usize) -> Option<Reference>;

/// A heap value with its type erased, along with the thunk that knows how to
/// drop it.  Used by `variable`/`constant` accessors and `values` entries.
pub(crate) struct OwnedErased {
    pub data: *mut Mu,
    destroy: unsafe fn(*mut Mu),
}

impl OwnedErased {
    pub fn new<T: 'static>(v: T) -> OwnedErased {
        unsafe fn drop_boxed<T>(p: *mut Mu) {
            drop(Box::from_raw(p as *mut T));
        }
        OwnedErased {
            data: Box::into_raw(Box::new(v)) as *mut Mu,
            destroy: drop_boxed::<T>,
        }
    }
}

impl Drop for OwnedErased {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.data) }
    }
}

type TypeThunk = fn() -> Type;
type ProjectFn = Box<dyn Fn(*mut Mu) -> *mut Mu>;
type AccessFn =
    Box<dyn Fn(AccessOp, *mut Mu, AccessCb) -> Result<()>>;

pub(crate) enum AccessorKind {
    /// Field projection by offset.  Stable address; inverse address is
    /// offset subtraction.  Also serves as the upcast to an embedded base.
    Member {
        ty: TypeThunk,
        project: ProjectFn,
        offset: usize,
    },
    /// Projection through a function returning a place inside the host.
    /// Addressable, no inverse.
    RefFunc { ty: TypeThunk, project: ProjectFn },
    /// The getter/setter family (`ref_funcs`, `value_func`, `value_funcs`,
    /// `mixed_funcs`, `assignable`).  Works on temporaries; never
    /// addressable.
    Funcs { ty: TypeThunk, access: AccessFn },
    /// Owns its target inside the accessor object.  Not addressable since
    /// the accessor may move.
    Variable { ty: TypeThunk, cell: OwnedErased },
    /// Like Variable but readonly.
    Constant { ty: TypeThunk, cell: OwnedErased },
    /// Borrows a value with static lifetime.  Readonly, addressable.
    ConstantPointer { ty: TypeThunk, ptr: *const Mu },
    /// Defers to a Reference computed from the host.
    ReferenceFunc {
        f: Box<dyn Fn(*mut Mu) -> Reference>,
    },
    /// Composition of two accessors.
    Chain { a: AcrRef, b: AcrRef },
    /// Dynamic attribute lookup, pinned to one key.
    ChainAttrFunc { f: AttrFnPtr, key: String },
    /// Dynamic element lookup, pinned to one index.
    ChainElemFunc { f: ElemFnPtr, index: usize },
}

pub struct Accessor {
    pub(crate) kind: AccessorKind,
    pub(crate) readonly: bool,
    /// Address-through is permitted even if the parent is not addressable.
    pub(crate) anchored: bool,
}

/// A shared handle to an accessor.  Accessors embedded in descriptions live
/// forever and are passed around by plain reference; accessors created at
/// runtime (chains, variables) are reference-counted.
#[derive(Clone)]
pub(crate) enum AcrRef {
    Static(&'static Accessor),
    Shared(Rc<Accessor>),
}

impl Deref for AcrRef {
    type Target = Accessor;
    fn deref(&self) -> &Accessor {
        match self {
            AcrRef::Static(a) => a,
            AcrRef::Shared(a) => a.as_ref(),
        }
    }
}

impl AcrRef {
    pub(crate) fn as_ptr(&self) -> *const Accessor {
        match self {
            AcrRef::Static(a) => *a as *const Accessor,
            AcrRef::Shared(a) => Rc::as_ptr(a),
        }
    }
}

/// An accessor whose host type is still known, so description builders can
/// check that the accessors they are handed actually project from the type
/// being described.  Dereferences to the underlying erased [`Accessor`].
pub struct AccessorFor<T> {
    pub(crate) acr: Accessor,
    _host: std::marker::PhantomData<fn(T)>,
}

impl<T> AccessorFor<T> {
    fn wrap(acr: Accessor) -> AccessorFor<T> {
        AccessorFor {
            acr,
            _host: std::marker::PhantomData,
        }
    }

    /// Mark this accessor readonly: writes through it will fail.
    pub fn readonly(mut self) -> AccessorFor<T> {
        self.acr.readonly = true;
        self
    }

    /// Mark this accessor anchored to its parent: its address may be used
    /// even if the parent's accessor was not addressable.
    pub fn anchored(mut self) -> AccessorFor<T> {
        self.acr.anchored = true;
        self
    }

    pub(crate) fn erase(self) -> Accessor {
        self.acr
    }
}

impl<T> Deref for AccessorFor<T> {
    type Target = Accessor;
    fn deref(&self) -> &Accessor {
        &self.acr
    }
}

impl Accessor {
    fn new(kind: AccessorKind) -> Accessor {
        Accessor {
            kind,
            readonly: false,
            anchored: false,
        }
    }

    fn new_readonly(kind: AccessorKind) -> Accessor {
        Accessor {
            kind,
            readonly: true,
            anchored: false,
        }
    }

    /// Mark this accessor readonly: writes through it will fail.
    pub fn readonly(mut self) -> Accessor {
        self.readonly = true;
        self
    }

    /// Mark this accessor anchored to its parent: its address may be used
    /// even if the parent's accessor was not addressable.
    pub fn anchored(mut self) -> Accessor {
        self.anchored = true;
        self
    }

    /// Compose: `a` projects from the host, then `b` projects from `a`'s
    /// target.  Readonly-ness is the OR of the two, anchoring the AND.
    pub(crate) fn chain(a: AcrRef, b: AcrRef) -> Accessor {
        let readonly = a.readonly || b.readonly;
        let anchored = a.anchored && b.anchored;
        Accessor {
            kind: AccessorKind::Chain { a, b },
            readonly,
            anchored,
        }
    }

    pub(crate) fn chain_attr_func(f: AttrFnPtr, key: String) -> Accessor {
        Accessor::new(AccessorKind::ChainAttrFunc { f, key })
    }

    pub(crate) fn chain_elem_func(f: ElemFnPtr, index: usize) -> Accessor {
        Accessor::new(AccessorKind::ChainElemFunc { f, index })
    }

    /// The type this accessor projects to.  Some kinds need the host value
    /// to answer; they report the empty Type when it isn't supplied.
    pub(crate) fn to_type(&self, from: Option<*mut Mu>) -> Type {
        use AccessorKind::*;
        match &self.kind {
            Member { ty, .. }
            | RefFunc { ty, .. }
            | Funcs { ty, .. }
            | Variable { ty, .. }
            | Constant { ty, .. }
            | ConstantPointer { ty, .. } => ty(),
            ReferenceFunc { f } => from
                .map(|p| f(p).type_of())
                .unwrap_or_default(),
            Chain { a, b } => {
                let r = b.to_type(None);
                if !r.is_empty() {
                    return r;
                }
                let Some(p) = from else {
                    return Type::empty();
                };
                let mut r = Type::empty();
                let _ = unsafe {
                    a.access(AccessOp::Read, p, &mut |m| {
                        r = b.to_type(Some(m));
                        Ok(())
                    })
                };
                r
            }
            ChainAttrFunc { f, key } => from
                .and_then(|p| f(p, key))
                .map(|r| r.type_of())
                .unwrap_or_default(),
            ChainElemFunc { f, index } => from
                .and_then(|p| f(p, *index))
                .map(|r| r.type_of())
                .unwrap_or_default(),
        }
    }

    /// Run the callback on the projected value.
    ///
    /// # Safety
    /// `from` must point to a valid value of this accessor's host type, and
    /// the callback must honor the op (no writes through a Read view).
    pub(crate) unsafe fn access(
        &self,
        op: AccessOp,
        from: *mut Mu,
        cb: AccessCb,
    ) -> Result<()> {
        if op != AccessOp::Read && self.readonly {
            return Err(Error::WriteReadonlyAccessor);
        }
        use AccessorKind::*;
        match &self.kind {
            Member { project, .. } | RefFunc { project, .. } => {
                cb(project(from))
            }
            Funcs { access, .. } => access(op, from, cb),
            Variable { cell, .. } | Constant { cell, .. } => cb(cell.data),
            ConstantPointer { ptr, .. } => cb(*ptr as *mut Mu),
            ReferenceFunc { f } => f(from).access(op, cb),
            Chain { a, b } => match op {
                AccessOp::Read => {
                    a.access(AccessOp::Read, from, &mut |m| unsafe {
                        b.access(AccessOp::Read, m, &mut *cb)
                    })
                }
                // Write through modify so sibling fields of the parent
                // are not clobbered
                AccessOp::Write => {
                    a.access(AccessOp::Modify, from, &mut |m| unsafe {
                        b.access(AccessOp::Write, m, &mut *cb)
                    })
                }
                AccessOp::Modify => {
                    a.access(AccessOp::Modify, from, &mut |m| unsafe {
                        b.access(AccessOp::Modify, m, &mut *cb)
                    })
                }
            },
            ChainAttrFunc { f, key } => match f(from, key) {
                Some(r) => r.access(op, cb),
                None => Err(Error::AttrNotFound {
                    location: Location::empty(),
                    key: key.clone(),
                }),
            },
            ChainElemFunc { f, index } => match f(from, *index) {
                Some(r) => r.access(op, cb),
                None => Err(Error::ElemNotFound {
                    location: Location::empty(),
                    index: *index,
                }),
            },
        }
    }

    /// A stable pointer to the projected value, or None if this accessor
    /// cannot guarantee stability.
    ///
    /// # Safety
    /// `from` must point to a valid value of this accessor's host type.
    pub(crate) unsafe fn address(&self, from: *mut Mu) -> Option<*mut Mu> {
        use AccessorKind::*;
        match &self.kind {
            Member { project, .. } | RefFunc { project, .. } => {
                Some(project(from))
            }
            Funcs { .. } | Variable { .. } | Constant { .. } => None,
            ConstantPointer { ptr, .. } => Some(*ptr as *mut Mu),
            ReferenceFunc { f } => f(from).address(),
            Chain { a, b } => {
                if b.anchored {
                    let mut r = None;
                    let _ = a.access(AccessOp::Read, from, &mut |m| {
                        r = unsafe { b.address(m) };
                        Ok(())
                    });
                    r
                } else if let Some(aa) = a.address(from) {
                    b.address(aa)
                } else {
                    None
                }
            }
            ChainAttrFunc { f, key } => {
                f(from, key).and_then(|r| r.address())
            }
            ChainElemFunc { f, index } => {
                f(from, *index).and_then(|r| r.address())
            }
        }
    }

    pub(crate) fn has_inverse_address(&self) -> bool {
        matches!(self.kind, AccessorKind::Member { .. })
    }

    /// Given a pointer to the projected value, recover the host pointer.
    /// Only field projections support this (offset subtraction).
    ///
    /// # Safety
    /// `to` must point at the projected sub-object of a live host value.
    pub(crate) unsafe fn inverse_address(
        &self,
        to: *mut Mu,
    ) -> Option<*mut Mu> {
        match &self.kind {
            AccessorKind::Member { offset, .. } => {
                Some((to as *mut u8).sub(*offset) as *mut Mu)
            }
            _ => None,
        }
    }
}

///// CONSTRUCTORS

/// Projects a field of the host.  Prefer the [`member!`] macro, which
/// derives both arguments from the field name.
pub fn member<T: 'static, F: Describe>(
    project: fn(*mut T) -> *mut F,
    offset: usize,
) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new(AccessorKind::Member {
        ty: Type::of::<F>,
        project: Box::new(move |p| project(p as *mut T) as *mut Mu),
        offset,
    }))
}

/// Field projection accessor: `member!(Struct, field)`.
#[macro_export]
macro_rules! member {
    ($T:ty, $($field:tt)+) => {
        $crate::accessor::member::<$T, _>(
            |p| unsafe { core::ptr::addr_of_mut!((*p).$($field)+) },
            core::mem::offset_of!($T, $($field)+),
        )
    };
}

/// Upcast to an embedded base field.  Same semantics as [`member!`]; the
/// distinct name documents intent at the use site.
#[macro_export]
macro_rules! base {
    ($T:ty, $($field:tt)+) => {
        $crate::member!($T, $($field)+)
    };
}

/// Projects through a function returning a mutable place inside the host.
/// Addressable; the function must return a stable location.
pub fn ref_func<T: 'static, F: Describe>(
    f: fn(&mut T) -> &mut F,
) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new(AccessorKind::RefFunc {
        ty: Type::of::<F>,
        project: Box::new(move |p| {
            f(unsafe { &mut *(p as *mut T) }) as *mut F as *mut Mu
        }),
    }))
}

/// Readonly projection through a function returning a shared place.
pub fn const_ref_func<T: 'static, F: Describe>(
    f: fn(&T) -> &F,
) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new_readonly(AccessorKind::RefFunc {
        ty: Type::of::<F>,
        project: Box::new(move |p| {
            f(unsafe { &*(p as *const T) }) as *const F as *mut Mu
        }),
    }))
}

/// Getter returning a borrowed value plus setter taking a borrowed value.
pub fn ref_funcs<T: 'static, F: Describe + Default + Clone>(
    g: fn(&T) -> &F,
    s: fn(&mut T, &F) -> Result<()>,
) -> AccessorFor<T> {
    let access: AccessFn = Box::new(move |op, from, cb| {
        let host = unsafe { &mut *(from as *mut T) };
        match op {
            AccessOp::Read => cb(g(host) as *const F as *mut Mu),
            AccessOp::Write => {
                let mut tmp = F::default();
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, &tmp)
            }
            AccessOp::Modify => {
                let mut tmp = g(host).clone();
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, &tmp)
            }
        }
    });
    AccessorFor::wrap(Accessor::new(AccessorKind::Funcs {
        ty: Type::of::<F>,
        access,
    }))
}

/// Readonly computed value.
pub fn value_func<T: 'static, F: Describe>(g: fn(&T) -> F) -> AccessorFor<T> {
    let access: AccessFn = Box::new(move |op, from, cb| {
        debug_assert_eq!(op, AccessOp::Read);
        let host = unsafe { &*(from as *const T) };
        let tmp = g(host);
        cb(&tmp as *const F as *mut Mu)
    });
    AccessorFor::wrap(Accessor::new_readonly(AccessorKind::Funcs {
        ty: Type::of::<F>,
        access,
    }))
}

/// Getter and setter both passing the value by move.
pub fn value_funcs<T: 'static, F: Describe + Default>(
    g: fn(&T) -> F,
    s: fn(&mut T, F) -> Result<()>,
) -> AccessorFor<T> {
    let access: AccessFn = Box::new(move |op, from, cb| {
        let host = unsafe { &mut *(from as *mut T) };
        match op {
            AccessOp::Read => {
                let tmp = g(host);
                cb(&tmp as *const F as *mut Mu)
            }
            AccessOp::Write => {
                let mut tmp = F::default();
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, tmp)
            }
            AccessOp::Modify => {
                let mut tmp = g(host);
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, tmp)
            }
        }
    });
    AccessorFor::wrap(Accessor::new(AccessorKind::Funcs {
        ty: Type::of::<F>,
        access,
    }))
}

/// Getter by move, setter by borrow.
pub fn mixed_funcs<T: 'static, F: Describe + Default>(
    g: fn(&T) -> F,
    s: fn(&mut T, &F) -> Result<()>,
) -> AccessorFor<T> {
    let access: AccessFn = Box::new(move |op, from, cb| {
        let host = unsafe { &mut *(from as *mut T) };
        match op {
            AccessOp::Read => {
                let tmp = g(host);
                cb(&tmp as *const F as *mut Mu)
            }
            AccessOp::Write => {
                let mut tmp = F::default();
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, &tmp)
            }
            AccessOp::Modify => {
                let mut tmp = g(host);
                cb(&mut tmp as *mut F as *mut Mu)?;
                s(host, &tmp)
            }
        }
    });
    AccessorFor::wrap(Accessor::new(AccessorKind::Funcs {
        ty: Type::of::<F>,
        access,
    }))
}

/// For hosts inter-convertible with another described type.
pub fn assignable<T, F>() -> AccessorFor<T>
where
    T: Clone + From<F> + 'static,
    F: Describe + Default + From<T>,
{
    let access: AccessFn = Box::new(move |op, from, cb| {
        let host = unsafe { &mut *(from as *mut T) };
        match op {
            AccessOp::Read => {
                let tmp = F::from(host.clone());
                cb(&tmp as *const F as *mut Mu)
            }
            AccessOp::Write => {
                let mut tmp = F::default();
                cb(&mut tmp as *mut F as *mut Mu)?;
                *host = T::from(tmp);
                Ok(())
            }
            AccessOp::Modify => {
                let mut tmp = F::from(host.clone());
                cb(&mut tmp as *mut F as *mut Mu)?;
                *host = T::from(tmp);
                Ok(())
            }
        }
    });
    AccessorFor::wrap(Accessor::new(AccessorKind::Funcs {
        ty: Type::of::<F>,
        access,
    }))
}

/// Owns a value inside the accessor.  Only valid from `attr_func`,
/// `elem_func`, or `reference_func`, since the storage dies with the
/// accessor; accordingly it is never addressable.
pub fn variable<T: 'static, F: Describe>(v: F) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new(AccessorKind::Variable {
        ty: Type::of::<F>,
        cell: OwnedErased::new(v),
    }))
}

/// Owns a readonly value inside the accessor.
pub fn constant<T: 'static, F: Describe>(v: F) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new_readonly(AccessorKind::Constant {
        ty: Type::of::<F>,
        cell: OwnedErased::new(v),
    }))
}

/// Readonly view of a value that outlives the program's descriptions.
pub fn constant_pointer<T: 'static, F: Describe>(
    p: &'static F,
) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new_readonly(AccessorKind::ConstantPointer {
        ty: Type::of::<F>,
        ptr: p as *const F as *const Mu,
    }))
}

/// Defers every operation to a Reference computed from the host.
pub fn reference_func<T: 'static>(
    f: fn(&mut T) -> Reference,
) -> AccessorFor<T> {
    AccessorFor::wrap(Accessor::new(AccessorKind::ReferenceFunc {
        f: Box::new(move |p| f(unsafe { &mut *(p as *mut T) })),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::Description;

    struct Thing {
        a: i32,
        b: i32,
    }

    impl Describe for Thing {
        fn describe() -> Description {
            Description::new::<Thing>("ayu::accessor::tests::Thing")
                .attr("a", member!(Thing, a))
                .attr("b", member!(Thing, b))
                .finish()
        }
    }

    unsafe fn read_i32(acr: &Accessor, t: &mut Thing) -> i32 {
        let mut got = 0;
        acr.access(
            AccessOp::Read,
            t as *mut Thing as *mut Mu,
            &mut |p| {
                got = unsafe { *(p as *const i32) };
                Ok(())
            },
        )
        .unwrap();
        got
    }

    unsafe fn check_ops(acr: &Accessor, addressable: bool) {
        let mut t = Thing { a: 1, b: 2 };
        let host = &mut t as *mut Thing as *mut Mu;
        if addressable {
            assert_eq!(
                acr.address(host).unwrap() as *const i32,
                &t.b as *const i32,
                "address"
            );
        } else {
            assert!(acr.address(host).is_none(), "address returns None");
        }
        assert_eq!(read_i32(acr, &mut t), 2, "read");
        acr.access(AccessOp::Write, host, &mut |p| {
            unsafe { *(p as *mut i32) = 4 };
            Ok(())
        })
        .unwrap();
        assert_eq!(t.b, 4, "write");
        acr.access(AccessOp::Modify, host, &mut |p| {
            unsafe { *(p as *mut i32) += 5 };
            Ok(())
        })
        .unwrap();
        assert_eq!(t.b, 9, "modify");
    }

    #[test]
    fn test_member() {
        unsafe { check_ops(&member!(Thing, b), true) }
    }

    #[test]
    fn test_member_inverse_address() {
        let acr = member!(Thing, b);
        let mut t = Thing { a: 1, b: 2 };
        unsafe {
            let b_ptr = acr
                .address(&mut t as *mut Thing as *mut Mu)
                .unwrap();
            assert_eq!(
                acr.inverse_address(b_ptr).unwrap() as *const Thing,
                &t as *const Thing,
            );
        }
    }

    #[test]
    fn test_ref_func() {
        unsafe { check_ops(&ref_func(|t: &mut Thing| &mut t.b), true) }
    }

    #[test]
    fn test_ref_funcs() {
        let acr = ref_funcs(
            |t: &Thing| &t.b,
            |t: &mut Thing, v: &i32| {
                t.b = *v;
                Ok(())
            },
        );
        unsafe { check_ops(&acr, false) }
    }

    #[test]
    fn test_value_funcs() {
        let acr = value_funcs(
            |t: &Thing| t.b,
            |t: &mut Thing, v: i32| {
                t.b = v;
                Ok(())
            },
        );
        unsafe { check_ops(&acr, false) }
    }

    #[test]
    fn test_mixed_funcs() {
        let acr = mixed_funcs(
            |t: &Thing| t.b,
            |t: &mut Thing, v: &i32| {
                t.b = *v;
                Ok(())
            },
        );
        unsafe { check_ops(&acr, false) }
    }

    #[test]
    fn test_readonly_write_fails() {
        let acr = value_func(|t: &Thing| t.b);
        let mut t = Thing { a: 1, b: 2 };
        let host = &mut t as *mut Thing as *mut Mu;
        let err = unsafe {
            acr.access(AccessOp::Write, host, &mut |_| Ok(()))
        };
        assert!(matches!(err, Err(Error::WriteReadonlyAccessor)));
        assert_eq!(t.b, 2, "host unchanged after readonly write");
        let err = unsafe {
            acr.access(AccessOp::Modify, host, &mut |_| Ok(()))
        };
        assert!(matches!(err, Err(Error::WriteReadonlyAccessor)));
    }

    #[test]
    fn test_chain() {
        struct Outer {
            inner: Thing,
        }
        impl Describe for Outer {
            fn describe() -> Description {
                Description::new::<Outer>("ayu::accessor::tests::Outer")
                    .attr("inner", member!(Outer, inner))
                    .finish()
            }
        }
        let a = Rc::new(member!(Outer, inner).erase());
        let b = Rc::new(member!(Thing, b).erase());
        let chain =
            Accessor::chain(AcrRef::Shared(a), AcrRef::Shared(b));
        let mut o = Outer {
            inner: Thing { a: 1, b: 2 },
        };
        let host = &mut o as *mut Outer as *mut Mu;
        unsafe {
            assert_eq!(
                chain.address(host).unwrap() as *const i32,
                &o.inner.b as *const i32,
            );
            chain
                .access(AccessOp::Write, host, &mut |p| {
                    *(p as *mut i32) = 77;
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(o.inner.b, 77);
        assert_eq!(o.inner.a, 1, "siblings survive write through chain");
    }

    #[test]
    fn test_chain_readonly_propagates() {
        let a = Rc::new(member!(Thing, b).erase());
        let b = Rc::new(member!(Thing, a).readonly().erase());
        let chain =
            Accessor::chain(AcrRef::Shared(a), AcrRef::Shared(b));
        assert!(chain.readonly);
    }
}
