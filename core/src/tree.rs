//! The main Tree datatype, an immutable reference-counted tagged value
//! representing an AYU structure.  Copying a Tree is cheap; the payload of
//! string, array, and object forms is shared, not cloned.

use crate::error::{Error, Result};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt::{self, Display, Formatter};
use std::ops::{BitOr, Index};
use std::rc::Rc;

/// For unambiguity, types of trees are called forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    Undefined,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
    /// Carries a stored error, used for inline diagnostic reporting.
    Error,
}

impl Display for Form {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Form::Undefined => "undefined",
            Form::Null => "null",
            Form::Bool => "bool",
            Form::Number => "number",
            Form::String => "string",
            Form::Array => "array",
            Form::Object => "object",
            Form::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Options that control how a Tree is printed.  These have no effect on the
/// semantics of the Tree and do not affect subtrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeFlags(u16);

impl TreeFlags {
    /// For number: print as hexadecimal.
    pub const PREFER_HEX: TreeFlags = TreeFlags(1 << 0);
    /// For array or object: when pretty-printing, print all on one line.
    pub const PREFER_COMPACT: TreeFlags = TreeFlags(1 << 1);
    /// For array or object: when pretty-printing, print one item per line.
    pub const PREFER_EXPANDED: TreeFlags = TreeFlags(1 << 2);

    pub fn contains(self, other: TreeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TreeFlags {
    type Output = TreeFlags;
    fn bitor(self, other: TreeFlags) -> TreeFlags {
        TreeFlags(self.0 | other.0)
    }
}

/// One attribute of an object-form tree.
pub type TreePair = (String, Tree);

#[derive(Clone)]
pub(crate) enum Rep {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(Rc<str>),
    Array(Rc<[Tree]>),
    Object(Rc<[TreePair]>),
    Error(Rc<Error>),
}

#[derive(Clone, Default)]
pub struct Tree {
    pub(crate) rep: Rep,
    pub(crate) flags: TreeFlags,
}

impl Default for Rep {
    fn default() -> Self {
        Rep::Undefined
    }
}

impl Tree {
    /// The null tree.
    pub fn null() -> Tree {
        Rep::Null.into()
    }

    /// An error-form tree wrapping a captured error.  Error trees compare
    /// unequal to everything and cannot be printed except for diagnostics.
    pub fn error(e: Error) -> Tree {
        Rep::Error(Rc::new(e)).into()
    }

    pub fn form(&self) -> Form {
        match self.rep {
            Rep::Undefined => Form::Undefined,
            Rep::Null => Form::Null,
            Rep::Bool(_) => Form::Bool,
            Rep::Int(_) | Rep::Double(_) => Form::Number,
            Rep::String(_) => Form::String,
            Rep::Array(_) => Form::Array,
            Rep::Object(_) => Form::Object,
            Rep::Error(_) => Form::Error,
        }
    }

    /// False only for the default-constructed undefined tree.
    pub fn has_value(&self) -> bool {
        !matches!(self.rep, Rep::Undefined)
    }

    pub fn flags(&self) -> TreeFlags {
        self.flags
    }

    /// Returns a copy with the given presentation flags added.
    pub fn with_flags(mut self, flags: TreeFlags) -> Tree {
        self.flags = self.flags | flags;
        self
    }

    /// Borrow the attribute with the given key, or None if this is not an
    /// object or has no such attribute.
    pub fn attr(&self, key: &str) -> Option<&Tree> {
        match &self.rep {
            Rep::Object(o) => o.iter().find(|p| p.0 == key).map(|p| &p.1),
            _ => None,
        }
    }

    /// Borrow the element at the given index, or None if this is not an
    /// array or the index is out of bounds.
    pub fn elem(&self, index: usize) -> Option<&Tree> {
        match &self.rep {
            Rep::Array(a) => a.get(index),
            _ => None,
        }
    }

    /// The captured error of an error-form tree.
    pub fn as_error(&self) -> Option<&Error> {
        match &self.rep {
            Rep::Error(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn wrong_form(&self, expected: Form) -> Error {
        if let Rep::Error(e) = &self.rep {
            (**e).clone()
        } else {
            Error::WrongForm {
                expected,
                tree: self.clone(),
            }
        }
    }

    fn cant_represent(&self, type_name: &str) -> Error {
        Error::CantRepresent {
            type_name: type_name.into(),
            tree: self.clone(),
        }
    }
}

impl From<Rep> for Tree {
    fn from(rep: Rep) -> Tree {
        Tree {
            rep,
            flags: TreeFlags::default(),
        }
    }
}

///// CONVERSION TO TREE

impl From<bool> for Tree {
    fn from(v: bool) -> Tree {
        Rep::Bool(v).into()
    }
}

macro_rules! tree_from_int {
    ($($t:ty),*) => { $(
        impl From<$t> for Tree {
            fn from(v: $t) -> Tree {
                Rep::Int(v as i64).into()
            }
        }
    )* };
}
tree_from_int!(i8, u8, i16, u16, i32, u32, i64, isize);

impl From<u64> for Tree {
    fn from(v: u64) -> Tree {
        match i64::try_from(v) {
            Ok(i) => Rep::Int(i).into(),
            Err(_) => Rep::Double(v as f64).into(),
        }
    }
}
impl From<usize> for Tree {
    fn from(v: usize) -> Tree {
        Tree::from(v as u64)
    }
}

impl From<f32> for Tree {
    fn from(v: f32) -> Tree {
        Rep::Double(v as f64).into()
    }
}
impl From<f64> for Tree {
    fn from(v: f64) -> Tree {
        Rep::Double(v).into()
    }
}

/// Plain chars are represented as one-character strings.
impl From<char> for Tree {
    fn from(v: char) -> Tree {
        Tree::from(v.to_string())
    }
}

impl From<&str> for Tree {
    fn from(v: &str) -> Tree {
        Rep::String(v.into()).into()
    }
}
impl From<String> for Tree {
    fn from(v: String) -> Tree {
        Rep::String(v.into()).into()
    }
}

impl From<Vec<Tree>> for Tree {
    fn from(v: Vec<Tree>) -> Tree {
        Rep::Array(v.into()).into()
    }
}
impl From<Vec<TreePair>> for Tree {
    fn from(v: Vec<TreePair>) -> Tree {
        Rep::Object(v.into()).into()
    }
}

///// CONVERSION FROM TREE
// These fail with WrongForm if the tree has the wrong form, and with
// CantRepresent if the requested type cannot store the value.

/// Checks that the tree is null.  The unit type stands in for null.
impl TryFrom<&Tree> for () {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<()> {
        match t.rep {
            Rep::Null => Ok(()),
            _ => Err(t.wrong_form(Form::Null)),
        }
    }
}

impl TryFrom<&Tree> for bool {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<bool> {
        match t.rep {
            Rep::Bool(v) => Ok(v),
            _ => Err(t.wrong_form(Form::Bool)),
        }
    }
}

macro_rules! tree_to_int {
    ($($t:ty),*) => { $(
        impl TryFrom<&Tree> for $t {
            type Error = Error;
            fn try_from(t: &Tree) -> Result<$t> {
                match t.rep {
                    Rep::Int(v) => <$t>::try_from(v)
                        .map_err(|_| t.cant_represent(stringify!($t))),
                    Rep::Double(v) => {
                        // Exact round trip or nothing
                        if v as $t as f64 == v {
                            Ok(v as $t)
                        } else {
                            Err(t.cant_represent(stringify!($t)))
                        }
                    }
                    _ => Err(t.wrong_form(Form::Number)),
                }
            }
        }
    )* };
}
tree_to_int!(i8, u8, i16, u16, i32, u32, i64, u64, usize, isize);

impl TryFrom<&Tree> for f64 {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<f64> {
        match t.rep {
            // null represents +nan for JSON compatibility
            Rep::Null => Ok(f64::NAN),
            Rep::Int(v) => Ok(v as f64),
            Rep::Double(v) => Ok(v),
            _ => Err(t.wrong_form(Form::Number)),
        }
    }
}
impl TryFrom<&Tree> for f32 {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<f32> {
        f64::try_from(t).map(|v| v as f32)
    }
}

impl TryFrom<&Tree> for char {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<char> {
        match &t.rep {
            Rep::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(t.cant_represent("char")),
                }
            }
            _ => Err(t.wrong_form(Form::String)),
        }
    }
}

impl TryFrom<&Tree> for String {
    type Error = Error;
    fn try_from(t: &Tree) -> Result<String> {
        match &t.rep {
            Rep::String(s) => Ok(s.to_string()),
            _ => Err(t.wrong_form(Form::String)),
        }
    }
}

impl<'t> TryFrom<&'t Tree> for &'t str {
    type Error = Error;
    fn try_from(t: &'t Tree) -> Result<&'t str> {
        match &t.rep {
            Rep::String(s) => Ok(s),
            _ => Err(t.wrong_form(Form::String)),
        }
    }
}

impl<'t> TryFrom<&'t Tree> for &'t [Tree] {
    type Error = Error;
    fn try_from(t: &'t Tree) -> Result<&'t [Tree]> {
        match &t.rep {
            Rep::Array(a) => Ok(a),
            _ => Err(t.wrong_form(Form::Array)),
        }
    }
}

impl<'t> TryFrom<&'t Tree> for &'t [TreePair] {
    type Error = Error;
    fn try_from(t: &'t Tree) -> Result<&'t [TreePair]> {
        match &t.rep {
            Rep::Object(o) => Ok(o),
            _ => Err(t.wrong_form(Form::Object)),
        }
    }
}

///// CONVENIENCE

impl Index<&str> for Tree {
    type Output = Tree;
    /// Panics if the tree is not an object or has no such attribute.  Use
    /// [`Tree::attr`] for a checked lookup.
    fn index(&self, key: &str) -> &Tree {
        match self.attr(key) {
            Some(t) => t,
            None => panic!("tree has no attr with key \"{}\"", key),
        }
    }
}

impl Index<usize> for Tree {
    type Output = Tree;
    /// Panics if the tree is not an array or the index is out of bounds.
    /// Use [`Tree::elem`] for a checked lookup.
    fn index(&self, index: usize) -> &Tree {
        match self.elem(index) {
            Some(t) => t,
            None => panic!("tree has no elem with index {}", index),
        }
    }
}

///// EQUALITY
// Trees of different forms are considered unequal, except that integer and
// float numbers can compare equal to each other.
//  - Unlike f64, Tree::from(f64::NAN) == Tree::from(f64::NAN).
//  - Like f64, -0.0 == +0.0.
//  - Objects are equal if they have all the same attributes, in any order.
//  - Error trees are never equal to anything, including themselves.

impl PartialEq for Tree {
    fn eq(&self, other: &Tree) -> bool {
        match (&self.rep, &other.rep) {
            (Rep::Null, Rep::Null) => true,
            (Rep::Bool(a), Rep::Bool(b)) => a == b,
            (Rep::Int(a), Rep::Int(b)) => a == b,
            (Rep::Int(a), Rep::Double(b)) => *a as f64 == *b,
            (Rep::Double(a), Rep::Int(b)) => *a == *b as f64,
            (Rep::Double(a), Rep::Double(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (Rep::String(a), Rep::String(b)) => a == b,
            (Rep::Array(a), Rep::Array(b)) => {
                Rc::ptr_eq(a, b) || a == b
            }
            (Rep::Object(a), Rep::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                if a.len() != b.len() {
                    return false;
                }
                a.iter().all(|(k, v)| {
                    b.iter().any(|(bk, bv)| bk == k && bv == v)
                })
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        crate::print::debug_tree(self, f)
    }
}

///// SERDE BRIDGE
// Lets a Tree be handed to any serde-based consumer.  Undefined and
// error-form trees are rejected; non-finite numbers pass through as f64 and
// take whatever treatment the target format gives them (serde_json renders
// them as null, matching the JSON print mode's treatment of +nan).

impl Serialize for Tree {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        match &self.rep {
            Rep::Undefined => {
                Err(S::Error::custom("cannot serialize undefined tree"))
            }
            Rep::Null => serializer.serialize_unit(),
            Rep::Bool(v) => serializer.serialize_bool(*v),
            Rep::Int(v) => serializer.serialize_i64(*v),
            Rep::Double(v) => serializer.serialize_f64(*v),
            Rep::String(s) => serializer.serialize_str(s),
            Rep::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for t in a.iter() {
                    seq.serialize_element(t)?;
                }
                seq.end()
            }
            Rep::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.len()))?;
                for (k, v) in o.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Rep::Error(e) => Err(S::Error::custom(format!(
                "cannot serialize error tree: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality() {
        assert_ne!(Tree::null(), Tree::from(0), "different forms are unequal");
        assert_eq!(Tree::from(3), Tree::from(3.0), "int vs float");
        assert_ne!(Tree::from(3), Tree::from(3.1), "int vs float (ne)");
        assert_eq!(
            Tree::from(f64::NAN),
            Tree::from(f64::NAN),
            "NAN equals NAN"
        );
        assert_eq!(Tree::from(-0.0), Tree::from(0.0), "-0 equals +0");
        assert_eq!(
            Tree::from(vec![Tree::from(3), Tree::from(4)]),
            Tree::from(vec![Tree::from(3), Tree::from(4)]),
        );
        assert_ne!(
            Tree::from(vec![Tree::from(3), Tree::from(4)]),
            Tree::from(vec![Tree::from(4), Tree::from(3)]),
        );
        assert_eq!(
            Tree::from(vec![
                ("a".to_owned(), Tree::from(0)),
                ("b".to_owned(), Tree::from(1)),
            ]),
            Tree::from(vec![
                ("b".to_owned(), Tree::from(1)),
                ("a".to_owned(), Tree::from(0)),
            ]),
            "object equality is order-independent"
        );
        assert_ne!(
            Tree::from(vec![("a".to_owned(), Tree::from(0))]),
            Tree::from(vec![
                ("a".to_owned(), Tree::from(0)),
                ("c".to_owned(), Tree::from(3)),
            ]),
            "extra attribute makes objects unequal"
        );
        let err = Tree::error(Error::WriteReadonlyAccessor);
        assert_ne!(err, err.clone(), "error trees equal nothing");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(String::try_from(&Tree::from("asdfg")).unwrap(), "asdfg");
        assert!(matches!(
            i32::try_from(&Tree::from("0")),
            Err(Error::WrongForm { .. })
        ));
        assert_eq!(i32::try_from(&Tree::from(3.0)).unwrap(), 3);
        assert_eq!(f64::try_from(&Tree::from(3)).unwrap(), 3.0);
        assert!(matches!(
            i32::try_from(&Tree::from(3.5)),
            Err(Error::CantRepresent { .. })
        ));
        assert!(matches!(
            i8::try_from(&Tree::from(1000)),
            Err(Error::CantRepresent { .. })
        ));
        assert!(matches!(
            u8::try_from(&Tree::from(-1)),
            Err(Error::CantRepresent { .. })
        ));
        assert!(f64::try_from(&Tree::null()).unwrap().is_nan());
        assert_eq!(char::try_from(&Tree::from("x")).unwrap(), 'x');
        assert!(char::try_from(&Tree::from("xy")).is_err());
    }

    #[test]
    fn test_attr_elem() {
        let t = Tree::from(vec![
            ("foo".to_owned(), Tree::from(1)),
            ("bar".to_owned(), Tree::from(2)),
        ]);
        assert_eq!(t.attr("bar"), Some(&Tree::from(2)));
        assert_eq!(t.attr("baz"), None);
        assert_eq!(t["foo"], Tree::from(1));
        let a = Tree::from(vec![Tree::from(5), Tree::from(6)]);
        assert_eq!(a.elem(1), Some(&Tree::from(6)));
        assert_eq!(a.elem(2), None);
        assert_eq!(a[0], Tree::from(5));
    }

    #[test]
    fn test_undefined() {
        let t = Tree::default();
        assert!(!t.has_value());
        assert_eq!(t.form(), Form::Undefined);
        assert!(Tree::null().has_value());
    }
}
