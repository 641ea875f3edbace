//! All error-related AYU types.
//!
//! Everything fallible in this crate returns [`Result`] with this module's
//! [`Error`].  Serialization and reference errors carry the [`Location`] of
//! the item that was being processed when the error was raised, so a failure
//! deep inside a resource load can be reported as e.g.
//! `missing attribute "b" at app:/config.ayu#window`.

use crate::location::Location;
use crate::resource::ResourceState;
use crate::tree::{Form, Tree};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Error)]
pub enum Error {
    ///// Tree errors

    /// Tried to treat a tree as though it has a form which it does not.
    #[error("expected {expected} tree, got {} tree", .tree.form())]
    WrongForm { expected: Form, tree: Tree },
    /// A numeric tree holds a value that doesn't fit in the requested type.
    #[error("cannot represent {tree:?} as {type_name}")]
    CantRepresent { type_name: String, tree: Tree },
    /// The textual input was malformed.
    #[error("parse error at {filename}:{line}:{col}: {msg}")]
    ParseError {
        msg: String,
        filename: String,
        line: u32,
        col: u32,
    },

    ///// Type errors

    /// A host type was used that has no registered description.
    #[error("type {type_name} has no description")]
    UnknownType { type_name: String },
    /// No type is registered under the given name.
    #[error("no type named {name}")]
    TypeNotFound { name: String },
    #[error("type {type_name} cannot be default constructed")]
    CannotDefaultConstruct { type_name: String },
    #[error("type {type_name} cannot be destroyed")]
    CannotDestroy { type_name: String },
    #[error("cannot coerce from {from} to {to}")]
    CannotCoerce { from: String, to: String },

    ///// Serialization errors

    #[error("type does not support to_tree{}", Loc(.location))]
    CannotToTree { location: Location },
    #[error("type does not support from_tree{}", Loc(.location))]
    CannotFromTree { location: Location },
    /// The item doesn't accept trees of the given form.
    #[error("item rejected {} tree{}", .tree.form(), Loc(.location))]
    InvalidForm { location: Location, tree: Tree },
    /// A values() description has no entry matching the item's current value.
    #[error("item's value has no name to serialize as{}", Loc(.location))]
    NoNameForValue { location: Location },
    /// A values() description has no entry matching the given tree.
    #[error("no value found for name {tree:?}{}", Loc(.location))]
    NoValueForName { location: Location, tree: Tree },
    #[error("missing attribute \"{key}\"{}", Loc(.location))]
    MissingAttr { location: Location, key: String },
    #[error("unwanted attribute \"{key}\"{}", Loc(.location))]
    UnwantedAttr { location: Location, key: String },
    #[error(
        "wrong array length (expected {min}..={max}, got {got}){}",
        Loc(.location)
    )]
    WrongLength {
        location: Location,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("item does not behave like an object{}", Loc(.location))]
    NoAttrs { location: Location },
    #[error("item does not behave like an array{}", Loc(.location))]
    NoElems { location: Location },
    #[error("item has no attribute \"{key}\"{}", Loc(.location))]
    AttrNotFound { location: Location, key: String },
    #[error("item has no element {index}{}", Loc(.location))]
    ElemNotFound { location: Location, index: usize },
    /// The keys() accessor did not serialize to an array of strings.
    #[error("keys accessor has invalid type {type_name}{}", Loc(.location))]
    InvalidKeysType {
        location: Location,
        type_name: String,
    },

    ///// Reference errors

    #[error("tried to write through a readonly accessor")]
    WriteReadonlyAccessor,
    #[error(
        "tried to write to a readonly reference to {type_name}{}",
        Loc(.location)
    )]
    WriteReadonlyReference {
        location: Location,
        type_name: String,
    },
    #[error("reference to {type_name} has no address{}", Loc(.location))]
    UnaddressableReference {
        location: Location,
        type_name: String,
    },
    /// A reference was not found anywhere in the universe.
    #[error("reference to {type_name} could not be resolved to a location")]
    UnresolvedReference { type_name: String },

    ///// Resource errors

    #[error("invalid resource name \"{name}\"")]
    InvalidResourceName { name: String },
    #[error("no resource scheme registered under \"{scheme}\"")]
    UnknownResourceScheme { scheme: String },
    #[error("resource scheme rejected the name \"{name}\"")]
    UnacceptableResourceName { name: String },
    #[error("resource scheme for \"{name}\" rejected the type {type_name}")]
    UnacceptableResourceType { name: String, type_name: String },
    #[error("a resource scheme named \"{scheme}\" is already registered")]
    DuplicateResourceScheme { scheme: String },
    #[error("cannot {tried} resource \"{name}\" in state {state:?}")]
    InvalidResourceState {
        tried: &'static str,
        state: ResourceState,
        name: String,
    },
    #[error("resource \"{name}\" cannot have an empty value")]
    EmptyResourceValue { name: String },
    /// Unloading would leave a dangling reference elsewhere.
    #[error("unloading would break reference at {from} pointing to {to}")]
    UnloadWouldBreak { from: Location, to: Location },
    /// Reloading could not relocate a reference into the new value.
    #[error("reloading would break reference at {from} pointing to {to}")]
    ReloadWouldBreak { from: Location, to: Location },
    #[error("failed to remove source of resource \"{name}\": {message}")]
    RemoveSourceFailed { name: String, message: String },

    ///// I/O errors

    #[error("failed to open {filename}: {message}")]
    OpenFailed { filename: String, message: String },
    #[error("failed to read {filename}: {message}")]
    ReadFailed { filename: String, message: String },
    #[error("failed to write {filename}: {message}")]
    WriteFailed { filename: String, message: String },
    #[error("failed to close {filename}: {message}")]
    CloseFailed { filename: String, message: String },
}

impl Error {
    /// The location attached to this error, if it carries one.
    pub fn location(&self) -> Option<&Location> {
        use Error::*;
        match self {
            CannotToTree { location }
            | CannotFromTree { location }
            | InvalidForm { location, .. }
            | NoNameForValue { location }
            | NoValueForName { location, .. }
            | MissingAttr { location, .. }
            | UnwantedAttr { location, .. }
            | WrongLength { location, .. }
            | NoAttrs { location }
            | NoElems { location }
            | AttrNotFound { location, .. }
            | ElemNotFound { location, .. }
            | InvalidKeysType { location, .. }
            | WriteReadonlyReference { location, .. }
            | UnaddressableReference { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Attach a location to an error raised without one.  Errors raised deep
    /// inside an accessor chain get their location filled in by the enclosing
    /// serialization call.
    pub(crate) fn with_location(mut self, loc: &Location) -> Self {
        use Error::*;
        match &mut self {
            CannotToTree { location }
            | CannotFromTree { location }
            | InvalidForm { location, .. }
            | NoNameForValue { location }
            | NoValueForName { location, .. }
            | MissingAttr { location, .. }
            | UnwantedAttr { location, .. }
            | WrongLength { location, .. }
            | NoAttrs { location }
            | NoElems { location }
            | AttrNotFound { location, .. }
            | ElemNotFound { location, .. }
            | InvalidKeysType { location, .. }
            | WriteReadonlyReference { location, .. }
            | UnaddressableReference { location, .. } => {
                if location.is_empty() {
                    *location = loc.clone();
                }
            }
            _ => {}
        }
        self
    }
}

/// Formats a location suffix for error messages, omitting it when empty.
struct Loc<'a>(&'a Location);

impl Display for Loc<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, " at {}", self.0)
        }
    }
}
