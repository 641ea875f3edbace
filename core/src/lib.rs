//! AYU is a reflection and serialization runtime: describe your value types
//! once, and AYU can convert them to and from a human-editable textual
//! tree, hold and manipulate them dynamically without knowing their static
//! type, address any sub-value through composable accessors, and manage
//! top-level values as named resources on disk whose cross-resource
//! references survive reload.
//!
//! ```
//! use ayu::{member, Describe, Description, PrintOptions, Reference};
//!
//! struct Player {
//!     name: String,
//!     hp: i32,
//! }
//!
//! impl Describe for Player {
//!     fn describe() -> Description {
//!         Description::new::<Player>("Player")
//!             .attr("name", member!(Player, name))
//!             .attr("hp", member!(Player, hp))
//!             .finish()
//!     }
//! }
//!
//! let mut p = Player { name: "aura".into(), hp: 120 };
//! let s = ayu::item_to_string(&Reference::to(&p), PrintOptions::compact())
//!     .unwrap();
//! assert_eq!(s, "{name:aura hp:120}");
//!
//! ayu::item_from_string(&Reference::to_mut(&mut p), "{name:luna hp:90}")
//!     .unwrap();
//! assert_eq!(p.hp, 90);
//! ```
//!
//! The crate is single-threaded by design: descriptions are immutable and
//! shared, but the universe of resources, the serialization queues, and
//! the caches are thread-local.  Everything fallible returns [`Result`].

#![deny(clippy::all)]

pub mod accessor;
pub mod describe;
mod describe_std;
pub mod dynamic;
pub mod error;
pub mod location;
pub mod parse;
pub mod print;
pub mod reference;
pub mod registry;
pub mod resource;
pub mod scan;
pub mod serialize;
pub mod tree;

pub use accessor::{
    assignable, const_ref_func, constant, constant_pointer, member,
    mixed_funcs, ref_func, ref_funcs, reference_func, value_func,
    value_funcs, variable, Accessor, AccessorFor,
};
pub use describe::{
    AttrFlags, Describe, Description, DescriptionBuilder, INCLUDE, OPTIONAL,
};
pub use dynamic::{Dynamic, Pointer};
pub use error::{Error, Result};
pub use location::Location;
pub use parse::{
    string_from_file, tree_from_file, tree_from_string,
    tree_from_string_named,
};
pub use print::{string_to_file, tree_to_file, tree_to_string, PrintOptions};
pub use reference::Reference;
pub use registry::{register, Type};
pub use resource::{
    current_resource, force_unload, force_unload_all, load, load_all,
    loaded_resources, register_scheme, reload, reload_all, remove_source,
    rename, resource_filename, save, save_all, set_default_file_root,
    source_exists, unload, unload_all, FileScheme, Resource,
    ResourceScheme, ResourceState,
};
pub use scan::{
    reference_from_location, reference_to_location, show_reference,
    KeepLocationCache,
};
pub use serialize::{
    current_location, item_attr, item_elem, item_from_file,
    item_from_string, item_from_tree, item_get_keys, item_get_length,
    item_maybe_attr, item_maybe_elem, item_set_keys, item_set_length,
    item_to_file, item_to_string, item_to_tree, DiagnosticSerialization,
};
pub use tree::{Form, Tree, TreeFlags, TreePair};
