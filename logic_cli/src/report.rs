//! Diagnostic printing shared by every subcommand. Mirrors the teacher's
//! `[lua_host]`/`[grim_engine]` prefixed `eprintln!` convention (see
//! `grim_engine::lua_host`) rather than a tracing crate.

use logic_core::{ApiObjects, LogicNode, ObjectHandle, PropertyIndex, PropertyTree, Value};

fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Vec2f(v) => format!("{v:?}"),
        Value::Vec3f(v) => format!("{v:?}"),
        Value::Vec4f(v) => format!("{v:?}"),
        Value::Vec2i(v) => format!("{v:?}"),
        Value::Vec3i(v) => format!("{v:?}"),
        Value::Vec4i(v) => format!("{v:?}"),
    }
}

/// Prints every leaf under `idx`, `path`-qualified, one per line.
fn dump_leaves(tree: &PropertyTree, idx: PropertyIndex, path: &str) {
    let prop = tree.get_prop(idx);
    let child_count = tree.child_count(idx);
    if child_count == 0 {
        let shown = if path.is_empty() { prop.name.clone() } else { format!("{path}.{}", prop.name) };
        match &prop.value {
            Some(v) => println!("  {shown} = {}", format_value(v)),
            None => println!("  {shown} = <unset>"),
        }
        return;
    }
    let next_path = if path.is_empty() { prop.name.clone() } else { format!("{path}.{}", prop.name) };
    for i in 0..child_count {
        let child = tree.child_by_index(idx, i).expect("index within child_count");
        dump_leaves(tree, child, &next_path);
    }
}

pub fn dump_node_output(engine: &ApiObjects, handle: ObjectHandle, label: &str) {
    let Some(node) = engine.node(handle) else {
        println!("[logic] '{label}' no longer exists");
        return;
    };
    match node {
        LogicNode::Script(s) => {
            println!("[logic] {label} output:");
            let tree = s.output_tree.borrow();
            dump_leaves(&tree, tree.root(), "");
        }
        LogicNode::Animation(a) => {
            println!("[logic] {label} output:");
            let tree = a.output_tree.borrow();
            dump_leaves(&tree, tree.root(), "");
        }
        LogicNode::Interface(i) => {
            println!("[logic] {label} (interface):");
            let tree = i.tree.borrow();
            dump_leaves(&tree, tree.root(), "");
        }
        _ => println!("[logic] '{label}' has no printable output tree"),
    }
}

pub fn dump_all_outputs(engine: &ApiObjects) {
    let mut handles: Vec<_> = engine.nodes().map(|(id, n)| (id, n.header().name.clone())).collect();
    handles.sort_by_key(|(id, _)| *id);
    for (id, name) in handles {
        if let Some(handle) = engine.find_by_id(id) {
            dump_node_output(engine, handle, &name);
        }
    }
}

pub fn report_errors(engine: &mut ApiObjects) {
    let errors = engine.errors();
    if errors.is_empty() {
        return;
    }
    for entry in errors {
        match &entry.source_location {
            Some(loc) => eprintln!("[logic] error at {loc}: {}", entry.error),
            None => eprintln!("[logic] error: {}", entry.error),
        }
    }
    engine.clear_errors();
}

pub fn report_warnings(engine: &ApiObjects) {
    for warning in engine.validate() {
        eprintln!("[logic] warning: {warning}");
    }
}
