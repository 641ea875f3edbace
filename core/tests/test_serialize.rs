//! Integration tests for describing types and converting them to and from
//! trees: attrs, includes, elems, values, delegates, and the swizzle/init
//! ordering.

use ayu::{
    item_elem, item_from_string, item_to_string, item_to_tree, member,
    tree_from_string, value_func, value_funcs, Describe, Description,
    DiagnosticSerialization, Error, Form, Location, PrintOptions,
    Reference, Tree, INCLUDE, OPTIONAL,
};

/// Serializes the value and asserts the compact output.
macro_rules! assert_serializes {
    ($value:expr, $expected:expr $(,)?) => {
        assert_eq!(
            item_to_string(&Reference::to(&$value), PrintOptions::compact())
                .unwrap(),
            $expected,
        );
    };
}

/// Deserializes into the value, expecting a particular error.
macro_rules! assert_from_error {
    ($value:expr, $src:expr, $pat:pat $(,)?) => {
        let r = item_from_string(&Reference::to_mut(&mut $value), $src);
        assert!(
            matches!(r, Err($pat)),
            "expected {} parsing {:?}, got {:?}",
            stringify!($pat),
            $src,
            r,
        );
    };
}

///// TEST TYPES

#[derive(Debug, Default, PartialEq)]
struct MemberTest {
    a: i32,
    b: i32,
}

impl Describe for MemberTest {
    fn describe() -> Description {
        Description::new::<MemberTest>("test::MemberTest")
            .default_constructible()
            .attr("a", member!(MemberTest, a))
            .attr("b", member!(MemberTest, b))
            .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct BaseTest {
    base: MemberTest,
    c: i32,
}

impl Describe for BaseTest {
    fn describe() -> Description {
        Description::new::<BaseTest>("test::BaseTest")
            .default_constructible()
            .attr("MemberTest", member!(BaseTest, base))
            .attr("c", member!(BaseTest, c))
            .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct InheritTest {
    base: BaseTest,
    d: i32,
}

impl Describe for InheritTest {
    fn describe() -> Description {
        Description::new::<InheritTest>("test::InheritTest")
            .default_constructible()
            .attr_with("BaseTest", member!(InheritTest, base), INCLUDE)
            .attr("d", member!(InheritTest, d))
            .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct InheritOptionalTest {
    base: BaseTest,
    d: i32,
}

impl Describe for InheritOptionalTest {
    fn describe() -> Description {
        Description::new::<InheritOptionalTest>(
            "test::InheritOptionalTest",
        )
        .default_constructible()
        .attr_with(
            "BaseTest",
            member!(InheritOptionalTest, base),
            INCLUDE | OPTIONAL,
        )
        .attr("d", member!(InheritOptionalTest, d))
        .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct ElemTest {
    x: f32,
    y: f32,
    z: f32,
}

impl Describe for ElemTest {
    fn describe() -> Description {
        Description::new::<ElemTest>("test::ElemTest")
            .default_constructible()
            .elem(member!(ElemTest, x))
            .elem(member!(ElemTest, y))
            .elem(member!(ElemTest, z))
            .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct DelegateTest {
    et: ElemTest,
}

impl Describe for DelegateTest {
    fn describe() -> Description {
        Description::new::<DelegateTest>("test::DelegateTest")
            .default_constructible()
            .delegate(member!(DelegateTest, et))
            .finish()
    }
}

#[derive(Debug, Default)]
struct SwizzleTest {
    swizzled: bool,
}

impl Describe for SwizzleTest {
    fn describe() -> Description {
        Description::new::<SwizzleTest>("test::SwizzleTest")
            .default_constructible()
            .swizzle(|v, _t| {
                v.swizzled = true;
                Ok(())
            })
            .finish()
    }
}

#[derive(Debug, Default)]
struct InitTest {
    value: i32,
    value_after_init: i32,
}

impl Describe for InitTest {
    fn describe() -> Description {
        Description::new::<InitTest>("test::InitTest")
            .default_constructible()
            .delegate(member!(InitTest, value))
            .init(|v| {
                v.value_after_init = v.value + 1;
                Ok(())
            })
            .finish()
    }
}

#[derive(Debug, Default)]
struct NestedInitTest {
    it: InitTest,
    it_val: i32,
}

impl Describe for NestedInitTest {
    fn describe() -> Description {
        Description::new::<NestedInitTest>("test::NestedInitTest")
            .default_constructible()
            .attr("it", member!(NestedInitTest, it))
            .init(|v| {
                v.it_val = v.it.value_after_init;
                Ok(())
            })
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ValuesTest {
    A,
    Null,
    Zero,
    Nan,
}

impl Default for ValuesTest {
    fn default() -> Self {
        ValuesTest::A
    }
}

impl Describe for ValuesTest {
    fn describe() -> Description {
        Description::new::<ValuesTest>("test::ValuesTest")
            .default_constructible()
            .value("vta", ValuesTest::A)
            .value(Tree::null(), ValuesTest::Null)
            .value(0, ValuesTest::Zero)
            .value(f64::NAN, ValuesTest::Nan)
            .finish()
    }
}

/// Packs two hex nibbles into one byte through value_funcs elems.
#[derive(Debug, Default, PartialEq)]
struct ScalarElem(u8);

impl Describe for ScalarElem {
    fn describe() -> Description {
        Description::new::<ScalarElem>("test::ScalarElem")
            .default_constructible()
            .elem(value_funcs::<ScalarElem, u8>(
                |v| v.0 >> 4,
                |v, m| {
                    v.0 = (v.0 & 0xf) | (m << 4);
                    Ok(())
                },
            ))
            .elem(value_funcs::<ScalarElem, u8>(
                |v| v.0 & 0xf,
                |v, m| {
                    v.0 = (v.0 & 0xf0) | (m & 0xf);
                    Ok(())
                },
            ))
            .finish()
    }
}

#[derive(Debug, Default)]
struct ReadonlyAttrTest {
    shown: i32,
}

impl Describe for ReadonlyAttrTest {
    fn describe() -> Description {
        Description::new::<ReadonlyAttrTest>("test::ReadonlyAttrTest")
            .default_constructible()
            .attr("shown", member!(ReadonlyAttrTest, shown))
            .attr_with(
                "doubled",
                value_func(|v: &ReadonlyAttrTest| v.shown * 2),
                OPTIONAL,
            )
            .finish()
    }
}

#[derive(Debug, Default)]
struct BadToTree;

impl Describe for BadToTree {
    fn describe() -> Description {
        Description::new::<BadToTree>("test::BadToTree")
            .default_constructible()
            .to_tree(|_| {
                Err(Error::CannotToTree {
                    location: Location::empty(),
                })
            })
            .from_tree(|_, _| Ok(()))
            .finish()
    }
}

#[derive(Debug, Default)]
struct Diagnosed {
    good: i32,
    bad: BadToTree,
}

impl Describe for Diagnosed {
    fn describe() -> Description {
        Description::new::<Diagnosed>("test::Diagnosed")
            .default_constructible()
            .attr("good", member!(Diagnosed, good))
            .attr("bad", member!(Diagnosed, bad))
            .finish()
    }
}

///// TESTS

#[test]
fn test_attrs() {
    let mut mt = MemberTest { a: 3, b: 4 };
    assert_serializes!(mt, "{a:3 b:4}");

    item_from_string(&Reference::to_mut(&mut mt), "{a:87 b:11}").unwrap();
    assert_eq!(mt, MemberTest { a: 87, b: 11 });
    item_from_string(&Reference::to_mut(&mut mt), "{b:92 a:47}").unwrap();
    assert_eq!(
        mt,
        MemberTest { a: 47, b: 92 },
        "attrs can come in any order"
    );

    assert_from_error!(mt, "{a:16}", Error::MissingAttr { .. });
    assert_from_error!(
        mt,
        "{a:0 b:1 c:60}",
        Error::UnwantedAttr { .. }
    );
    assert_from_error!(mt, "{a:41 b:foo}", Error::WrongForm { .. });
    assert_from_error!(mt, "{a:41 b:4.3}", Error::CantRepresent { .. });
    assert_from_error!(mt, "[54 43]", Error::InvalidForm { .. });
}

#[test]
fn test_include() {
    let mut bt = BaseTest {
        base: MemberTest { a: -1, b: -2 },
        c: -3,
    };
    assert_serializes!(bt, "{MemberTest:{a:-1 b:-2} c:-3}");
    item_from_string(
        &Reference::to_mut(&mut bt),
        "{c:-4 MemberTest:{a:-5 b:-6}}",
    )
    .unwrap();
    assert_eq!(bt.base.b, -6);
    // Collapsing is only allowed when the attr is marked include
    assert_from_error!(
        bt,
        "{a:-7 b:-8 c:-9}",
        Error::MissingAttr { .. },
    );

    let mut it = InheritTest {
        base: BaseTest {
            base: MemberTest { a: 99, b: 88 },
            c: 77,
        },
        d: 66,
    };
    assert_serializes!(it, "{MemberTest:{a:99 b:88} c:77 d:66}");
    item_from_string(
        &Reference::to_mut(&mut it),
        "{d:55 c:44 MemberTest:{a:33 b:22}}",
    )
    .unwrap();
    assert_eq!(it.base.base.a, 33, "collapsed include");
    item_from_string(
        &Reference::to_mut(&mut it),
        "{d:51 BaseTest:{c:41 MemberTest:{b:31 a:21}}}",
    )
    .unwrap();
    assert_eq!(it.base.base.b, 31, "uncollapsed include");
}

#[test]
fn test_include_optional() {
    let mut iot = InheritOptionalTest {
        base: BaseTest {
            base: MemberTest { a: 23, b: 24 },
            c: 25,
        },
        d: 26,
    };
    item_from_string(&Reference::to_mut(&mut iot), "{d:44}").unwrap();
    assert_eq!(iot.d, 44);
    assert_eq!(
        iot.base.base.a, 23,
        "omitted optional include leaves the target alone"
    );
    assert_from_error!(
        iot,
        "{d:34 MemberTest:{a:56 b:67}}",
        Error::MissingAttr { .. },
    );
    assert_from_error!(
        iot,
        "{d:34 c:78}",
        Error::MissingAttr { .. },
    );
}

#[test]
fn test_elems() {
    let mut et = ElemTest {
        x: 0.5,
        y: 1.5,
        z: 2.5,
    };
    assert_serializes!(et, "[0.5 1.5 2.5]");
    item_from_string(&Reference::to_mut(&mut et), "[3.5 4.5 5.5]")
        .unwrap();
    assert_eq!(et.y, 4.5);
    assert_from_error!(et, "[6.5 7.5]", Error::WrongLength { .. });
    assert_from_error!(
        et,
        "[6.5 7.5 8.5 9.5]",
        Error::WrongLength { .. },
    );
    assert_from_error!(et, "{x:1.1 y:2.2}", Error::InvalidForm { .. });
}

#[test]
fn test_delegate() {
    let mut dt = DelegateTest {
        et: ElemTest {
            x: 4.0,
            y: 5.0,
            z: 6.0,
        },
    };
    assert_serializes!(dt, "[4 5 6]");
    item_from_string(&Reference::to_mut(&mut dt), "[7 8 9]").unwrap();
    assert_eq!(dt.et.y, 8.0);
    let elem2 = item_elem(&Reference::to_mut(&mut dt), 2).unwrap();
    assert_eq!(
        elem2.address().unwrap() as *const f32,
        &dt.et.z as *const f32,
        "item_elem reaches through the delegate to the real field"
    );
}

#[test]
fn test_values() {
    let mut vt = ValuesTest::A;
    assert_serializes!(vt, "vta");
    vt = ValuesTest::Null;
    assert_serializes!(vt, "null");
    vt = ValuesTest::Zero;
    assert_serializes!(vt, "0");
    vt = ValuesTest::Nan;
    assert_serializes!(vt, "+nan");

    item_from_string(&Reference::to_mut(&mut vt), "vta").unwrap();
    assert_eq!(vt, ValuesTest::A);
    item_from_string(&Reference::to_mut(&mut vt), "null").unwrap();
    assert_eq!(vt, ValuesTest::Null);
    item_from_string(&Reference::to_mut(&mut vt), "0").unwrap();
    assert_eq!(vt, ValuesTest::Zero);
    item_from_string(&Reference::to_mut(&mut vt), "+nan").unwrap();
    assert_eq!(vt, ValuesTest::Nan);
    assert_from_error!(vt, "bogus", Error::NoValueForName { .. });
}

#[test]
fn test_scalar_elems() {
    let mut se = ScalarElem(0xab);
    assert_eq!(
        item_to_tree(&Reference::to(&se), &Location::empty()).unwrap(),
        tree_from_string("[0xa 0xb]").unwrap(),
    );
    item_from_string(&Reference::to_mut(&mut se), "[0xc 0xd]").unwrap();
    assert_eq!(se, ScalarElem(0xcd));
}

#[test]
fn test_swizzle() {
    let mut stv: Vec<SwizzleTest> = Vec::new();
    item_from_string(&Reference::to_mut(&mut stv), "[{}{}{}{}{}{}]")
        .unwrap();
    assert_eq!(stv.len(), 6);
    assert!(stv[4].swizzled, "swizzle ran after structural build");
}

#[test]
fn test_init() {
    let mut it = InitTest::default();
    item_from_string(&Reference::to_mut(&mut it), "6").unwrap();
    assert_eq!(it.value_after_init, 7);

    let mut nit = NestedInitTest::default();
    item_from_string(&Reference::to_mut(&mut nit), "{it:55}").unwrap();
    assert_eq!(nit.it_val, 56, "children get init before their parent");
}

#[test]
fn test_readonly_attrs_are_dropped() {
    let mut rt = ReadonlyAttrTest { shown: 21 };
    assert_eq!(
        item_to_string(
            &Reference::to_mut(&mut rt),
            PrintOptions::compact()
        )
        .unwrap(),
        "{shown:21}",
    );
    let mut rt2 = ReadonlyAttrTest::default();
    item_from_string(&Reference::to_mut(&mut rt2), "{shown:3}").unwrap();
    assert_eq!(rt2.shown, 3);
    // Supplying the readonly attr anyway fails on write
    assert_from_error!(
        rt2,
        "{shown:3 doubled:6}",
        Error::WriteReadonlyAccessor,
    );
}

#[test]
fn test_diagnostic_serialization() {
    let d = Diagnosed::default();
    assert!(item_to_tree(&Reference::to(&d), &Location::empty()).is_err());

    let _scope = DiagnosticSerialization::new();
    let tree = item_to_tree(&Reference::to(&d), &Location::empty())
        .expect("diagnostic scope turns errors into error trees");
    assert_eq!(tree.attr("good"), Some(&Tree::from(0)));
    assert_eq!(tree.attr("bad").unwrap().form(), Form::Error);
}

#[test]
fn test_read_then_write_is_identity() {
    // For any writeable target, writing back what was read is a no-op
    let mut et = ElemTest {
        x: 1.0,
        y: 2.0,
        z: 3.0,
    };
    let r = Reference::to_mut(&mut et);
    let tree = r.to_tree().unwrap();
    r.from_tree(&tree).unwrap();
    assert_eq!(
        et,
        ElemTest {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        }
    );
}

#[test]
fn test_dynamic_containers_roundtrip() {
    let mut v: Vec<MemberTest> = Vec::new();
    item_from_string(
        &Reference::to_mut(&mut v),
        "[{a:1 b:2} {a:3 b:4}]",
    )
    .unwrap();
    assert_eq!(v.len(), 2);
    assert_eq!(v[1], MemberTest { a: 3, b: 4 });
    assert_serializes!(v, "[{a:1 b:2} {a:3 b:4}]");
}
