//! Runtime-typed values.
//!
//! [`Dynamic`] owns a heap value of any described type; it has value
//! semantics but no copy, and moves transfer ownership.  [`Pointer`] is the
//! borrowed counterpart: a trivially copyable (type, address) pair that does
//! not own anything and supports casts along the description's base chain.

use crate::describe::Describe;
use crate::error::{Error, Result};
use crate::registry::{Mu, Type};

/// A (type, address) pair with pointer semantics.  The empty pointer has
/// the empty type and a null address.
///
/// Like a raw pointer, a Pointer carries no lifetime; using it after the
/// pointed-to value is gone is undefined behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pointer {
    ty: Type,
    addr: *mut Mu,
}

impl Default for Pointer {
    fn default() -> Pointer {
        Pointer::empty()
    }
}

impl Pointer {
    pub fn empty() -> Pointer {
        Pointer {
            ty: Type::empty(),
            addr: std::ptr::null_mut(),
        }
    }

    pub(crate) fn raw(ty: Type, addr: *mut Mu) -> Pointer {
        Pointer { ty, addr }
    }

    pub fn to<T: Describe>(v: &T) -> Pointer {
        Pointer {
            ty: Type::of::<T>().add_readonly(),
            addr: v as *const T as *mut Mu,
        }
    }

    pub fn to_mut<T: Describe>(v: &mut T) -> Pointer {
        Pointer {
            ty: Type::of::<T>(),
            addr: v as *mut T as *mut Mu,
        }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn address(&self) -> *mut Mu {
        self.addr
    }

    pub fn is_empty(&self) -> bool {
        self.ty.is_empty()
    }

    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    /// Borrow the pointed-to value with a concrete type, casting along the
    /// description's base chain if needed.
    ///
    /// # Safety
    /// The pointed-to value must still be alive, and no conflicting mutable
    /// borrow may exist.
    pub unsafe fn get<'a, T: Describe>(&self) -> Result<&'a T> {
        let p = self.ty.cast_to(Type::of::<T>(), self.addr)?;
        Ok(&*(p as *const T))
    }

    /// # Safety
    /// See [`Pointer::get`]; additionally no other borrow may exist.
    pub unsafe fn get_mut<'a, T: Describe>(&self) -> Result<&'a mut T> {
        if self.ty.readonly() {
            return Err(Error::WriteReadonlyReference {
                location: crate::location::Location::empty(),
                type_name: self.ty.name().to_owned(),
            });
        }
        let p = self.ty.cast_to(Type::of::<T>(), self.addr)?;
        Ok(&mut *(p as *mut T))
    }

    pub fn try_upcast_to(&self, to: Type) -> Option<Pointer> {
        let addr = unsafe { self.ty.try_upcast_to(to, self.addr)? };
        Some(Pointer { ty: to, addr })
    }

    pub fn try_downcast_to(&self, to: Type) -> Option<Pointer> {
        let addr = unsafe { self.ty.try_downcast_to(to, self.addr)? };
        Some(Pointer { ty: to, addr })
    }

    pub fn try_cast_to(&self, to: Type) -> Option<Pointer> {
        let addr = unsafe { self.ty.try_cast_to(to, self.addr)? };
        Some(Pointer { ty: to, addr })
    }

    pub fn cast_to(&self, to: Type) -> Result<Pointer> {
        self.try_cast_to(to).ok_or_else(|| Error::CannotCoerce {
            from: self.ty.name().to_owned(),
            to: to.name().to_owned(),
        })
    }
}

/// A dynamically typed owned value.  The empty Dynamic has the empty type
/// and a null slot; any other Dynamic has both a type and a value.
pub struct Dynamic {
    ty: Type,
    data: *mut Mu,
}

impl Default for Dynamic {
    fn default() -> Dynamic {
        Dynamic::empty()
    }
}

impl Dynamic {
    pub fn empty() -> Dynamic {
        Dynamic {
            ty: Type::empty(),
            data: std::ptr::null_mut(),
        }
    }

    /// Move a typed value in.
    pub fn new<T: Describe>(v: T) -> Dynamic {
        Dynamic {
            ty: Type::of::<T>(),
            data: Box::into_raw(Box::new(v)) as *mut Mu,
        }
    }

    /// Default-construct a value of the given type.
    pub fn of_type(ty: Type) -> Result<Dynamic> {
        let data = ty.default_new()?;
        Ok(Dynamic { ty, data })
    }

    /// Take ownership of a raw allocation.  The allocation must have been
    /// made with the type's layout and hold a valid value.
    pub(crate) unsafe fn from_raw(ty: Type, data: *mut Mu) -> Dynamic {
        Dynamic { ty, data }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn has_value(&self) -> bool {
        debug_assert_eq!(self.ty.is_empty(), self.data.is_null());
        !self.ty.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_value()
    }

    /// A non-owning pointer to the held value.
    pub fn ptr(&self) -> Pointer {
        Pointer {
            ty: self.ty,
            addr: self.data,
        }
    }

    /// Borrow the held value with a concrete type.
    pub fn get<T: Describe>(&self) -> Result<&T> {
        if self.is_empty() {
            return Err(Error::UnknownType {
                type_name: "(empty Dynamic)".into(),
            });
        }
        unsafe { self.ptr().get() }
    }

    pub fn get_mut<T: Describe>(&mut self) -> Result<&mut T> {
        if self.is_empty() {
            return Err(Error::UnknownType {
                type_name: "(empty Dynamic)".into(),
            });
        }
        unsafe { self.ptr().get_mut() }
    }

    /// Move the held value out, if its type matches exactly.
    pub fn take<T: Describe>(mut self) -> Result<T> {
        if self.ty != Type::of::<T>() {
            return Err(Error::CannotCoerce {
                from: self.ty.name().to_owned(),
                to: Type::of::<T>().name().to_owned(),
            });
        }
        let data = std::mem::replace(&mut self.data, std::ptr::null_mut());
        self.ty = Type::empty();
        Ok(*unsafe { Box::from_raw(data as *mut T) })
    }
}

impl Drop for Dynamic {
    fn drop(&mut self) {
        if !self.data.is_null() {
            unsafe {
                if self.ty.destroy(self.data).is_err() {
                    // A type without a destroy thunk leaks rather than
                    // freeing storage that still holds a live value
                    log::error!(
                        "leaking a Dynamic of type {} with no destroy thunk",
                        self.ty.name()
                    );
                    return;
                }
                self.ty.deallocate(self.data);
            }
        }
    }
}

impl std::fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Dynamic(empty)")
        } else {
            write!(f, "Dynamic({})", self.ty.name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_value_semantics() {
        let d = Dynamic::new(31337i32);
        assert!(d.has_value());
        assert_eq!(d.ty(), Type::of::<i32>());
        assert_eq!(*d.get::<i32>().unwrap(), 31337);
        assert_eq!(d.take::<i32>().unwrap(), 31337);

        let e = Dynamic::empty();
        assert!(e.is_empty());
        assert!(e.ty().is_empty());
    }

    #[test]
    fn test_dynamic_of_type() {
        let d = Dynamic::of_type(Type::of::<String>()).unwrap();
        assert_eq!(d.get::<String>().unwrap(), "");
    }

    #[test]
    fn test_take_wrong_type() {
        let d = Dynamic::new(5i32);
        assert!(matches!(
            d.take::<String>(),
            Err(Error::CannotCoerce { .. })
        ));
    }

    #[test]
    fn test_pointer_casts() {
        let mut v = 42i32;
        let p = Pointer::to_mut(&mut v);
        assert_eq!(p.ty(), Type::of::<i32>());
        assert!(p.try_cast_to(Type::of::<String>()).is_none());
        let q = p.cast_to(Type::of::<i32>()).unwrap();
        assert_eq!(unsafe { *q.get::<i32>().unwrap() }, 42);
    }
}
