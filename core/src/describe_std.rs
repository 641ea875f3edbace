//! Built-in descriptions: native scalars, standard containers, and this
//! crate's own types (so errors, locations, and references can themselves
//! be serialized).

use crate::accessor::{mixed_funcs, reference_func, value_funcs};
use crate::member;
use crate::describe::{Describe, Description};
use crate::dynamic::{Dynamic, Pointer};
use crate::error::Error;
use crate::location::{resolve_iri, Location};
use crate::reference::Reference;
use crate::registry::Type;
use crate::resource::Resource;
use crate::scan::{reference_from_location, reference_to_location};
use crate::serialize::{current_location, item_from_tree, item_to_tree};
use crate::tree::{Form, Tree};
use std::collections::{BTreeMap, HashMap};
use url::Url;

///// SCALARS

macro_rules! describe_scalar {
    ($($t:ty),* $(,)?) => { $(
        impl Describe for $t {
            fn describe() -> Description {
                Description::new::<$t>(stringify!($t))
                    .default_constructible()
                    .to_tree(|v| Ok(Tree::from(v.clone())))
                    .from_tree(|v, t| {
                        *v = <$t>::try_from(t)?;
                        Ok(())
                    })
                    .finish()
            }
        }
    )* };
}

describe_scalar!(
    bool, char, i8, u8, i16, u16, i32, u32, i64, u64, isize, usize, f32,
    f64, String,
);

impl Describe for () {
    fn describe() -> Description {
        Description::new::<()>("()")
            .default_constructible()
            .to_tree(|_| Ok(Tree::null()))
            .from_tree(|v, t| {
                *v = <()>::try_from(t)?;
                Ok(())
            })
            .finish()
    }
}

///// CONTAINERS

impl<T: Describe + Default> Describe for Vec<T> {
    fn describe() -> Description {
        let name = format!("[{}]", Type::of::<T>().name());
        Description::new::<Vec<T>>(&name)
            .default_constructible()
            .length(value_funcs::<Vec<T>, usize>(
                |v| v.len(),
                |v, l| {
                    v.resize_with(l, T::default);
                    Ok(())
                },
            ))
            .elem_func(|v, i| v.get_mut(i).map(Reference::to_mut))
            .finish()
    }
}

impl<T: Describe + Default> Describe for Option<T> {
    fn describe() -> Description {
        let name = format!("Option<{}>", Type::of::<T>().name());
        Description::new::<Option<T>>(&name)
            .default_constructible()
            .to_tree(|v| match v {
                None => Ok(Tree::null()),
                Some(inner) => {
                    item_to_tree(&Reference::to(inner), &current_location())
                }
            })
            .from_tree(|v, t| {
                if t.form() == Form::Null {
                    *v = None;
                    return Ok(());
                }
                let mut inner = T::default();
                item_from_tree(
                    &Reference::to_mut(&mut inner),
                    t,
                    &current_location(),
                    false,
                )?;
                *v = Some(inner);
                Ok(())
            })
            .finish()
    }
}

impl<V: Describe + Default> Describe for HashMap<String, V> {
    fn describe() -> Description {
        let name = format!("Map<String, {}>", Type::of::<V>().name());
        Description::new::<HashMap<String, V>>(&name)
            .default_constructible()
            .keys(mixed_funcs::<HashMap<String, V>, Vec<String>>(
                |v| {
                    // Sorted so output is deterministic
                    let mut ks: Vec<String> =
                        v.keys().cloned().collect();
                    ks.sort();
                    ks
                },
                |v, ks| {
                    v.clear();
                    for k in ks {
                        v.insert(k.clone(), V::default());
                    }
                    Ok(())
                },
            ))
            .attr_func(|v, k| v.get_mut(k).map(Reference::to_mut))
            .finish()
    }
}

impl<V: Describe + Default> Describe for BTreeMap<String, V> {
    fn describe() -> Description {
        let name =
            format!("OrderedMap<String, {}>", Type::of::<V>().name());
        Description::new::<BTreeMap<String, V>>(&name)
            .default_constructible()
            .keys(mixed_funcs::<BTreeMap<String, V>, Vec<String>>(
                |v| v.keys().cloned().collect(),
                |v, ks| {
                    v.clear();
                    for k in ks {
                        v.insert(k.clone(), V::default());
                    }
                    Ok(())
                },
            ))
            .attr_func(|v, k| v.get_mut(k).map(Reference::to_mut))
            .finish()
    }
}

impl<A: Describe, B: Describe> Describe for (A, B) {
    fn describe() -> Description {
        let name = format!(
            "({}, {})",
            Type::of::<A>().name(),
            Type::of::<B>().name()
        );
        Description::new::<(A, B)>(&name)
            .elem(member!((A, B), 0))
            .elem(member!((A, B), 1))
            .finish()
    }
}

impl<A: Describe, B: Describe, C: Describe> Describe for (A, B, C) {
    fn describe() -> Description {
        let name = format!(
            "({}, {}, {})",
            Type::of::<A>().name(),
            Type::of::<B>().name(),
            Type::of::<C>().name()
        );
        Description::new::<(A, B, C)>(&name)
            .elem(member!((A, B, C), 0))
            .elem(member!((A, B, C), 1))
            .elem(member!((A, B, C), 2))
            .finish()
    }
}

impl<A: Describe, B: Describe, C: Describe, D: Describe> Describe
    for (A, B, C, D)
{
    fn describe() -> Description {
        let name = format!(
            "({}, {}, {}, {})",
            Type::of::<A>().name(),
            Type::of::<B>().name(),
            Type::of::<C>().name(),
            Type::of::<D>().name()
        );
        Description::new::<(A, B, C, D)>(&name)
            .elem(member!((A, B, C, D), 0))
            .elem(member!((A, B, C, D), 1))
            .elem(member!((A, B, C, D), 2))
            .elem(member!((A, B, C, D), 3))
            .finish()
    }
}

///// CRATE TYPES

impl Describe for Tree {
    fn describe() -> Description {
        Description::new::<Tree>("ayu::Tree")
            .default_constructible()
            .to_tree(|v| Ok(v.clone()))
            .from_tree(|v, t| {
                *v = t.clone();
                Ok(())
            })
            .finish()
    }
}

impl Describe for Form {
    fn describe() -> Description {
        Description::new::<Form>("ayu::Form")
            .value("undefined", Form::Undefined)
            .value("null", Form::Null)
            .value("bool", Form::Bool)
            .value("number", Form::Number)
            .value("string", Form::String)
            .value("array", Form::Array)
            .value("object", Form::Object)
            .value("error", Form::Error)
            .finish()
    }
}

impl Describe for Type {
    fn describe() -> Description {
        Description::new::<Type>("ayu::Type")
            .default_constructible()
            .values_custom(
                |a, b| a == b,
                |a, b| {
                    *a = *b;
                    Ok(())
                },
            )
            .custom_value(Tree::null(), Type::empty())
            .delegate(mixed_funcs::<Type, String>(
                |v| v.name().to_owned(),
                |v, s| {
                    *v = Type::from_name(s)?;
                    Ok(())
                },
            ))
            .finish()
    }
}

// A Dynamic serializes as [type-name value]; null is the empty Dynamic.
// Writing element 0 replaces the value with a default-constructed one of
// that type, then element 1 fills it in place.
impl Describe for Dynamic {
    fn describe() -> Description {
        Description::new::<Dynamic>("ayu::Dynamic")
            .default_constructible()
            .values_custom(
                |a, b| a.has_value() == b.has_value(),
                |a, _b| {
                    *a = Dynamic::empty();
                    Ok(())
                },
            )
            .custom_value(Tree::null(), Dynamic::empty())
            .elem(value_funcs::<Dynamic, Type>(
                |v| v.ty(),
                |v, t| {
                    *v = Dynamic::of_type(t)?;
                    Ok(())
                },
            ))
            .elem(reference_func::<Dynamic>(|v| v.ptr().into()))
            .finish()
    }
}

fn current_base() -> Option<Url> {
    current_location().root_resource().map(|r| r.name())
}

// A Reference serializes as the location of its referent, rendered
// relative to the current resource.  Deserialization stores nothing at
// from_tree time and resolves the location in swizzle, after the
// surrounding graph is structurally built; resolving may itself load other
// resources.
impl Describe for Reference {
    fn describe() -> Description {
        Description::new::<Reference>("ayu::Reference")
            .default_constructible()
            .to_tree(|v| {
                if v.is_empty() {
                    return Ok(Tree::null());
                }
                let loc = reference_to_location(v)?;
                let s =
                    loc.iri_string_relative_to(current_base().as_ref())?;
                Ok(Tree::from(s))
            })
            .from_tree(|v, _t| {
                *v = Reference::empty();
                Ok(())
            })
            .swizzle(|v, t| {
                if t.form() == Form::Null {
                    return Ok(());
                }
                let s = <&str>::try_from(t)?;
                let iri = resolve_iri(s, current_base().as_ref())?;
                let loc = Location::from_iri(&iri)?;
                *v = reference_from_location(&loc)?;
                Ok(())
            })
            .finish()
    }
}

// Pointers serialize like References but must resolve to an address.
impl Describe for Pointer {
    fn describe() -> Description {
        Description::new::<Pointer>("ayu::Pointer")
            .default_constructible()
            .to_tree(|v| {
                if v.is_empty() {
                    return Ok(Tree::null());
                }
                let r = Reference::from(*v);
                let loc = reference_to_location(&r)?;
                let s =
                    loc.iri_string_relative_to(current_base().as_ref())?;
                Ok(Tree::from(s))
            })
            .from_tree(|v, _t| {
                *v = Pointer::empty();
                Ok(())
            })
            .swizzle(|v, t| {
                if t.form() == Form::Null {
                    return Ok(());
                }
                let s = <&str>::try_from(t)?;
                let iri = resolve_iri(s, current_base().as_ref())?;
                let loc = Location::from_iri(&iri)?;
                let r = reference_from_location(&loc)?;
                let addr = r.require_address()?;
                *v = Pointer::raw(r.type_of(), addr);
                Ok(())
            })
            .finish()
    }
}

impl Describe for Location {
    fn describe() -> Description {
        Description::new::<Location>("ayu::Location")
            .default_constructible()
            .to_tree(|v| {
                if v.is_empty() {
                    return Ok(Tree::null());
                }
                let s =
                    v.iri_string_relative_to(current_base().as_ref())?;
                Ok(Tree::from(s))
            })
            .from_tree(|v, t| {
                if t.form() == Form::Null {
                    *v = Location::empty();
                    return Ok(());
                }
                let s = <&str>::try_from(t)?;
                let iri = resolve_iri(s, current_base().as_ref())?;
                *v = Location::from_iri(&iri)?;
                Ok(())
            })
            .finish()
    }
}

impl Describe for Url {
    fn describe() -> Description {
        Description::new::<Url>("ayu::Iri")
            .to_tree(|v| {
                let s = match current_base() {
                    Some(base) => base
                        .make_relative(v)
                        .unwrap_or_else(|| v.to_string()),
                    None => v.to_string(),
                };
                Ok(Tree::from(s))
            })
            .from_tree(|v, t| {
                let s = <&str>::try_from(t)?;
                *v = resolve_iri(s, current_base().as_ref())?;
                Ok(())
            })
            .finish()
    }
}

impl Describe for Resource {
    fn describe() -> Description {
        Description::new::<Resource>("ayu::Resource")
            .to_tree(|v| {
                let name = v.name();
                let s = match current_base() {
                    Some(base) => base
                        .make_relative(&name)
                        .unwrap_or_else(|| name.to_string()),
                    None => name.to_string(),
                };
                Ok(Tree::from(s))
            })
            .from_tree(|v, t| {
                let s = <&str>::try_from(t)?;
                *v = Resource::new(s)?;
                Ok(())
            })
            .finish()
    }
}

// Errors are described so diagnostic serialization can embed them.
impl Describe for Error {
    fn describe() -> Description {
        Description::new::<Error>("ayu::Error")
            .to_tree(|v| Ok(Tree::from(v.to_string())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::PrintOptions;
    use crate::serialize::{item_from_string, item_to_string};

    #[test]
    fn test_tuple_roundtrip() {
        let mut data = <(i32, String, Vec<i32>)>::default();
        item_from_string(&Reference::to_mut(&mut data), "[45 asdf [3 4 5]]")
            .unwrap();
        assert_eq!(data, (45, "asdf".to_owned(), vec![3, 4, 5]));
        let s = item_to_string(
            &Reference::to(&data),
            PrintOptions::compact(),
        )
        .unwrap();
        assert_eq!(s, "[45 asdf [3 4 5]]");
    }

    #[test]
    fn test_vec() {
        let mut v: Vec<i32> = vec![1, 2];
        item_from_string(&Reference::to_mut(&mut v), "[5 6 7]").unwrap();
        assert_eq!(v, vec![5, 6, 7]);
        assert_eq!(
            item_to_string(&Reference::to(&v), PrintOptions::compact())
                .unwrap(),
            "[5 6 7]"
        );
    }

    #[test]
    fn test_map() {
        let mut m: HashMap<String, i32> = HashMap::new();
        item_from_string(&Reference::to_mut(&mut m), "{a:1 b:2}").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["a"], 1);
        assert_eq!(m["b"], 2);
        assert_eq!(
            item_to_string(&Reference::to(&m), PrintOptions::compact())
                .unwrap(),
            "{a:1 b:2}"
        );
    }

    #[test]
    fn test_option() {
        let mut o: Option<i32> = None;
        item_from_string(&Reference::to_mut(&mut o), "3").unwrap();
        assert_eq!(o, Some(3));
        item_from_string(&Reference::to_mut(&mut o), "null").unwrap();
        assert_eq!(o, None);
        assert_eq!(
            item_to_string(&Reference::to(&o), PrintOptions::compact())
                .unwrap(),
            "null"
        );
    }

    #[test]
    fn test_form_values() {
        let mut f = Form::Null;
        assert_eq!(
            item_to_string(&Reference::to(&f), PrintOptions::compact())
                .unwrap(),
            "\"null\"",
        );
        item_from_string(&Reference::to_mut(&mut f), "array").unwrap();
        assert_eq!(f, Form::Array);
    }

    #[test]
    fn test_dynamic() {
        crate::register::<i32>();
        let mut d = Dynamic::empty();
        item_from_string(&Reference::to_mut(&mut d), "[i32 51]").unwrap();
        assert_eq!(*d.get::<i32>().unwrap(), 51);
        assert_eq!(
            item_to_string(&Reference::to(&d), PrintOptions::compact())
                .unwrap(),
            "[i32 51]"
        );
        item_from_string(&Reference::to_mut(&mut d), "null").unwrap();
        assert!(d.is_empty());
    }
}
