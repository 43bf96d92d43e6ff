//! Black-box coverage for scenarios that only show up once several
//! nodes are linked and ticked together -- the narrower unit tests in
//! `lua::extractor`/`lua::iter_helpers` exercise the same machinery in
//! isolation, these drive it through `ApiObjects` the way a save file
//! would.

use logic_core::facade::DependencyConfig;
use logic_core::lua::StdModules;
use logic_core::{ApiObjects, LogicNode, PropertyRef, TreeSide, Value};

fn field_ref(engine: &ApiObjects, handle: logic_core::ObjectHandle, side: TreeSide, path: &[&str]) -> PropertyRef {
    let LogicNode::Script(script) = engine.node(handle).unwrap() else { panic!("expected script") };
    let tree = match side {
        TreeSide::Input => script.input_tree.borrow(),
        TreeSide::Output => script.output_tree.borrow(),
        TreeSide::Interface => panic!("scripts have no interface tree"),
    };
    let mut idx = tree.root();
    for segment in path {
        idx = tree.child_by_name(idx, segment).unwrap_or_else(|| panic!("no field '{segment}' in path {path:?}"));
    }
    PropertyRef::new(handle.id(), side, idx)
}

/// Two fields of one script's output struct, linked to two different
/// leaves of another script's input struct -- one crossing into a
/// nested struct field, one landing on a plain leaf -- then
/// concatenated into a single string.
#[test]
fn struct_crossover_links_nested_and_flat_fields_into_a_string() {
    let mut engine = ApiObjects::new_headless().unwrap();

    let producer = engine
        .create_script(
            "producer",
            r#"
                function interface(IN, OUT)
                    OUT.output = STRING
                    OUT.nested = {str1 = STRING, str2 = STRING}
                end
                function run(IN, OUT)
                    OUT.output = "foo"
                    OUT.nested.str1 = "str1"
                end
            "#,
            DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
        )
        .unwrap();

    let consumer = engine
        .create_script(
            "consumer",
            r#"
                function interface(IN, OUT)
                    IN.input = STRING
                    IN.nested = {str1 = STRING, str2 = STRING}
                    OUT.combined = STRING
                end
                function run(IN, OUT)
                    OUT.combined = IN.input .. " {" .. IN.nested.str1 .. ", " .. IN.nested.str2 .. "}"
                end
            "#,
            DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
        )
        .unwrap();

    engine
        .link(
            field_ref(&engine, producer, TreeSide::Output, &["output"]),
            field_ref(&engine, consumer, TreeSide::Input, &["nested", "str1"]),
        )
        .unwrap();
    engine
        .link(
            field_ref(&engine, producer, TreeSide::Output, &["nested", "str1"]),
            field_ref(&engine, consumer, TreeSide::Input, &["input"]),
        )
        .unwrap();

    {
        let LogicNode::Script(consumer_script) = engine.node(consumer).unwrap() else { panic!("expected script") };
        let mut tree = consumer_script.input_tree.borrow_mut();
        let root = tree.root();
        let str2 = tree.child_by_name(root, "nested").and_then(|n| tree.child_by_name(n, "str2")).unwrap();
        tree.set_internal(str2, Value::String("str2".to_string())).unwrap();
    }

    engine.update().unwrap();

    let LogicNode::Script(consumer_script) = engine.node(consumer).unwrap() else { panic!("expected script") };
    let tree = consumer_script.output_tree.borrow();
    let combined = tree.child_by_name(tree.root(), "combined").unwrap();
    assert_eq!(tree.get::<String>(combined), Some("str1 {foo, str2}".to_string()));
}

/// A module's plain Lua table return value, iterated by a dependent
/// script with `rl_ipairs` -- `rl_ipairs` dispatches on the Lua value's
/// type, so a module's result needs no wrapping to be iterable.
#[test]
fn script_iterates_a_modules_table_with_rl_ipairs() {
    let mut engine = ApiObjects::new_headless().unwrap();

    let values = engine
        .create_module("values", "return {11, 12}", DependencyConfig { std_modules: StdModules::ALL, modules: &[] })
        .unwrap();

    let script = engine
        .create_script(
            "summer",
            r#"
                modules('values')
                function interface(IN, OUT)
                    OUT.first = INT32
                    OUT.second = INT32
                end
                function run(IN, OUT)
                    local out = {}
                    for i, v in rl_ipairs(GLOBAL.values) do
                        out[i] = v
                    end
                    OUT.first = out[1]
                    OUT.second = out[2]
                end
            "#,
            DependencyConfig { std_modules: StdModules::ALL, modules: &[("values", values)] },
        )
        .unwrap();

    engine.update().unwrap();

    let LogicNode::Script(script) = engine.node(script).unwrap() else { panic!("expected script") };
    let tree = script.output_tree.borrow();
    let root = tree.root();
    let first = tree.child_by_name(root, "first").unwrap();
    let second = tree.child_by_name(root, "second").unwrap();
    assert_eq!(tree.get::<i32>(first), Some(11));
    assert_eq!(tree.get::<i32>(second), Some(12));
}
