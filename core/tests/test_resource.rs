//! Integration tests for the resource lifecycle: load/save/unload/reload,
//! cross-resource references, and the verification scans that keep them
//! from breaking.

use ayu::{
    item_attr, load, member, register, register_scheme, reload, rename,
    remove_source, resource_filename, save, source_exists, tree_from_file,
    tree_from_string, unload, unload_all, Describe, Description, Dynamic,
    Error, FileScheme, Reference, Resource, ResourceScheme, ResourceState,
    Type,
};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct TestDoc {
    foo: Vec<i32>,
    bar: String,
}

impl Describe for TestDoc {
    fn describe() -> Description {
        Description::new::<TestDoc>("TestDoc")
            .default_constructible()
            .attr("foo", member!(TestDoc, foo))
            .attr("bar", member!(TestDoc, bar))
            .finish()
    }
}

#[derive(Debug, Default)]
struct Node {
    target: Vec<i32>,
    other: Reference,
}

impl Describe for Node {
    fn describe() -> Description {
        Description::new::<Node>("Node")
            .default_constructible()
            .attr("target", member!(Node, target))
            .attr("other", member!(Node, other))
            .finish()
    }
}

/// Registers the test scheme in this test's universe and returns the
/// directory backing it.
fn setup() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    register_scheme("ayu-test", FileScheme::new(dir.path())).unwrap();
    register::<TestDoc>();
    register::<Node>();
    dir
}

fn write_file(dir: &TempDir, name: &str, content: &str) {
    std::fs::write(dir.path().join(name), content).unwrap();
}

#[test]
fn test_load_value_unload() {
    let dir = setup();
    write_file(&dir, "testfile.ayu", "[TestDoc {foo:[1 2 3] bar:qux}]");

    let input = Resource::new("ayu-test:/testfile.ayu").unwrap();
    assert_eq!(
        input.state(),
        ResourceState::Unloaded,
        "resources start out unloaded"
    );
    load(&input).unwrap();
    assert_eq!(input.state(), ResourceState::Loaded);

    let bar = item_attr(&input.reference().unwrap(), "bar").unwrap();
    assert_eq!(bar.get_as::<String>().unwrap(), "qux");

    assert!(
        matches!(
            Resource::with_value(
                "ayu-test:/testfile.ayu",
                Dynamic::new(3i32)
            ),
            Err(Error::InvalidResourceState { .. })
        ),
        "creating an already-loaded resource fails"
    );

    unload(&input).unwrap();
    assert_eq!(input.state(), ResourceState::Unloaded);
    assert!(input.get_reference().is_none());

    // reference() loads on demand
    let foo1 = input
        .reference()
        .unwrap()
        .attr("foo")
        .unwrap()
        .elem(1)
        .unwrap();
    assert_eq!(foo1.get_as::<i32>().unwrap(), 2);
    assert_eq!(input.state(), ResourceState::Loaded);
}

#[test]
fn test_rename_save_remove() {
    let dir = setup();
    write_file(&dir, "testfile.ayu", "[TestDoc {foo:[1 2 3] bar:qux}]");

    let input = Resource::new("ayu-test:/testfile.ayu").unwrap();
    let output = Resource::new("ayu-test:/test-output.ayu").unwrap();
    load(&input).unwrap();

    assert!(
        matches!(save(&output), Err(Error::InvalidResourceState { .. })),
        "save fails on an unloaded resource"
    );

    rename(&input, &output).unwrap();
    assert_eq!(input.state(), ResourceState::Unloaded);
    assert_eq!(output.state(), ResourceState::Loaded);

    save(&output).unwrap();
    assert_eq!(
        tree_from_file(resource_filename(&output).unwrap()).unwrap(),
        tree_from_string("[TestDoc {foo:[1 2 3] bar:qux}]").unwrap(),
        "resource was saved with the right contents"
    );

    assert!(source_exists(&output).unwrap());
    remove_source(&output).unwrap();
    assert!(!source_exists(&output).unwrap());
    remove_source(&output).unwrap(); // removing twice is fine
    assert_eq!(
        output.state(),
        ResourceState::Loaded,
        "remove_source leaves the value alone"
    );
    unload(&output).unwrap();
    assert!(
        matches!(load(&output), Err(Error::OpenFailed { .. })),
        "the file is gone after remove_source"
    );
    assert_eq!(output.state(), ResourceState::Unloaded);
}

#[test]
fn test_cross_resource_reference() {
    let dir = setup();
    write_file(&dir, "testfile.ayu", "[TestDoc {foo:[1 2 3] bar:qux}]");
    write_file(
        &dir,
        "other.ayu",
        "[Node {target:[5] other:\"testfile.ayu#bar\"}]",
    );

    let other = Resource::new("ayu-test:/other.ayu").unwrap();
    load(&other).unwrap();
    let input = Resource::new("ayu-test:/testfile.ayu").unwrap();
    assert_eq!(
        input.state(),
        ResourceState::Loaded,
        "loading a resource loads the resources it references"
    );

    let held = item_attr(&other.reference().unwrap(), "other")
        .unwrap()
        .get_as::<Reference>()
        .unwrap();
    let bar = item_attr(&input.reference().unwrap(), "bar").unwrap();
    assert_eq!(
        held.address().unwrap(),
        bar.address().unwrap(),
        "the loaded reference points at the target's item"
    );

    assert!(
        matches!(unload(&input), Err(Error::UnloadWouldBreak { .. })),
        "can't unload a resource another resource references"
    );
    assert_eq!(input.state(), ResourceState::Loaded);

    unload(&other).unwrap();
    unload(&input).unwrap();
}

#[test]
fn test_save_reference_as_location() {
    let dir = setup();
    write_file(&dir, "testfile.ayu", "[TestDoc {foo:[1 2 3] bar:qux}]");

    let input = Resource::new("ayu-test:/testfile.ayu").unwrap();
    load(&input).unwrap();

    let mut node = Node::default();
    node.other =
        item_attr(&input.reference().unwrap(), "bar").unwrap();
    let res =
        Resource::with_value("ayu-test:/noderes.ayu", Dynamic::new(node))
            .unwrap();
    save(&res).unwrap();
    assert_eq!(
        tree_from_file(resource_filename(&res).unwrap()).unwrap(),
        tree_from_string(
            "[Node {target:[] other:\"ayu-test:/testfile.ayu#bar\"}]"
        )
        .unwrap(),
        "references save as the location of their referent"
    );

    // A reference within the same resource saves as a bare fragment
    let node2 = Node {
        target: vec![9],
        other: Reference::empty(),
    };
    let res2 = Resource::with_value(
        "ayu-test:/noderes2.ayu",
        Dynamic::new(node2),
    )
    .unwrap();
    let target0 = item_attr(&res2.reference().unwrap(), "target")
        .unwrap()
        .elem(0)
        .unwrap();
    item_attr(&res2.reference().unwrap(), "other")
        .unwrap()
        .set_as::<Reference>(target0)
        .unwrap();
    save(&res2).unwrap();
    assert_eq!(
        tree_from_file(resource_filename(&res2).unwrap()).unwrap(),
        tree_from_string("[Node {target:[9] other:\"#target/0\"}]")
            .unwrap(),
    );
}

#[test]
fn test_reference_cycle() {
    let dir = setup();
    write_file(
        &dir,
        "rec1.ayu",
        "[Node {target:[11] other:\"rec2.ayu#target/0\"}]",
    );
    write_file(
        &dir,
        "rec2.ayu",
        "[Node {target:[22] other:\"rec1.ayu#target/0\"}]",
    );

    let rec1 = Resource::new("ayu-test:/rec1.ayu").unwrap();
    let rec2 = Resource::new("ayu-test:/rec2.ayu").unwrap();
    load(&rec1).unwrap();
    assert_eq!(
        rec2.state(),
        ResourceState::Loaded,
        "loading one side of a cycle loads the other"
    );

    let rec1_held = |rec1: &Resource| {
        item_attr(&rec1.reference().unwrap(), "other")
            .unwrap()
            .get_as::<Reference>()
            .unwrap()
    };
    let rec2_target0 = item_attr(&rec2.reference().unwrap(), "target")
        .unwrap()
        .elem(0)
        .unwrap();
    assert_eq!(
        rec1_held(&rec1).address().unwrap(),
        rec2_target0.address().unwrap(),
    );

    assert!(matches!(
        unload(&rec1),
        Err(Error::UnloadWouldBreak { .. })
    ));
    assert!(matches!(
        unload(&rec2),
        Err(Error::UnloadWouldBreak { .. })
    ));
    unload_all(&[rec1.clone(), rec2.clone()])
        .expect("a whole cycle can be unloaded at once");
    assert_eq!(rec1.state(), ResourceState::Unloaded);
    assert_eq!(rec2.state(), ResourceState::Unloaded);
}

#[test]
fn test_reload_updates_references() {
    let dir = setup();
    write_file(
        &dir,
        "rec1.ayu",
        "[Node {target:[11] other:\"rec2.ayu#target/0\"}]",
    );
    write_file(
        &dir,
        "rec2.ayu",
        "[Node {target:[22] other:\"rec1.ayu#target/0\"}]",
    );

    let rec1 = Resource::new("ayu-test:/rec1.ayu").unwrap();
    let rec2 = Resource::new("ayu-test:/rec2.ayu").unwrap();
    load(&rec1).unwrap();

    let held = item_attr(&rec1.reference().unwrap(), "other")
        .unwrap()
        .get_as::<Reference>()
        .unwrap();
    let old_addr = held.address().unwrap();

    reload(&rec2).unwrap();

    let held = item_attr(&rec1.reference().unwrap(), "other")
        .unwrap()
        .get_as::<Reference>()
        .unwrap();
    let new_addr = held.address().unwrap();
    assert_ne!(new_addr, old_addr, "reference was relocated by reload");
    let target0 = item_attr(&rec2.reference().unwrap(), "target")
        .unwrap()
        .elem(0)
        .unwrap();
    assert_eq!(
        new_addr,
        target0.address().unwrap(),
        "reference points into the new value"
    );

    // A reload that invalidates the location fails and rolls back
    write_file(&dir, "rec2.ayu", "[Node {target:[] other:null}]");
    assert!(matches!(
        reload(&rec2),
        Err(Error::ReloadWouldBreak { .. })
    ));
    assert_eq!(rec2.state(), ResourceState::Loaded);
    let target0 = item_attr(&rec2.reference().unwrap(), "target")
        .unwrap()
        .elem(0)
        .unwrap();
    assert_eq!(
        target0.get_as::<i32>().unwrap(),
        22,
        "old value was restored after the failed reload"
    );
}

#[test]
fn test_batch_load_rolls_back() {
    let dir = setup();
    write_file(&dir, "good.ayu", "[TestDoc {foo:[] bar:ok}]");

    let good = Resource::new("ayu-test:/good.ayu").unwrap();
    let missing = Resource::new("ayu-test:/missing.ayu").unwrap();
    assert!(matches!(
        ayu::load_all(&[good.clone(), missing.clone()]),
        Err(Error::OpenFailed { .. })
    ));
    assert_eq!(good.state(), ResourceState::Unloaded);
    assert_eq!(missing.state(), ResourceState::Unloaded);
}

#[test]
fn test_scheme_gating() {
    struct DocsOnly;
    impl ResourceScheme for DocsOnly {
        fn accepts_type(&self, ty: Type) -> bool {
            ty == Type::of::<TestDoc>()
        }
        fn get_file(&self, _iri: &url::Url) -> Option<std::path::PathBuf> {
            None
        }
    }

    let dir = setup();
    register_scheme("docs", DocsOnly).unwrap();
    register::<i32>();

    assert!(matches!(
        Resource::new("nope:/x"),
        Err(Error::UnknownResourceScheme { .. })
    ));
    assert!(matches!(
        Resource::new("ayu-test:/x?query=1"),
        Err(Error::UnacceptableResourceName { .. })
    ));
    assert!(matches!(
        register_scheme("ayu-test", FileScheme::new(dir.path())),
        Err(Error::DuplicateResourceScheme { .. })
    ));
    assert!(matches!(
        register_scheme("Bad Scheme", DocsOnly),
        Err(Error::InvalidResourceName { .. })
    ));

    let wrong = Resource::new("docs:/value.ayu").unwrap();
    assert!(matches!(
        wrong.set_value(Dynamic::new(5i32)),
        Err(Error::UnacceptableResourceType { .. })
    ));
    assert!(wrong
        .set_value(Dynamic::new(TestDoc::default()))
        .is_ok());
}
