//! Type extractor: builds frozen `TypeNode` schemas from a script's
//! `interface(IN, OUT)` (or an interface's `interface(inout)`) call.
//!
//! Grounded on `original_source/lib/internals/PropertyTypeExtractor.cpp`
//! for the assignment rules (primitive-id number, struct table, or
//! `ARRAY(n, T)` userdata) and on `SolState.cpp` for the set of numeric
//! type ids published as Lua globals.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, MetaMethod, Table, UserData, UserDataMethods, Value as LuaValue};

use crate::error::LogicError;
use crate::types::schema::TypeNode;
use crate::types::value::ValueType;

const PRIMITIVE_CODES: &[(&str, ValueType)] = &[
    ("FLOAT", ValueType::Float),
    ("INT32", ValueType::Int32),
    ("INT64", ValueType::Int64),
    ("STRING", ValueType::String),
    ("BOOL", ValueType::Bool),
    ("VEC2F", ValueType::Vec2f),
    ("VEC3F", ValueType::Vec3f),
    ("VEC4F", ValueType::Vec4f),
    ("VEC2I", ValueType::Vec2i),
    ("VEC3I", ValueType::Vec3i),
    ("VEC4I", ValueType::Vec4i),
];

fn code_for(ty: ValueType) -> i64 {
    PRIMITIVE_CODES
        .iter()
        .position(|(_, t)| *t == ty)
        .expect("every primitive ValueType has a registered code") as i64
}

fn type_for_code(code: i64) -> Option<ValueType> {
    if code < 0 {
        return None;
    }
    PRIMITIVE_CODES.get(code as usize).map(|(_, t)| *t)
}

fn to_lua_err(e: LogicError) -> mlua::Error {
    mlua::Error::RuntimeError(e.to_string())
}

/// Publishes `FLOAT`, `INT32`, ..., `ARRAY(n, T)`, and the `Type:Array`
/// spelling on `target` as plain (non-metatable-gated) entries, so an
/// `interface()` body can write `IN.speed = FLOAT` or
/// `IN.samples = ARRAY(4, FLOAT)` regardless of which sandbox protection
/// mode is active: a raw table hit never reaches the env's restrictive
/// `__index`, so these constants stay readable even though they aren't
/// among the names a given mode otherwise allows.
pub fn install_globals<'lua>(lua: &'lua Lua, target: &Table<'lua>) -> mlua::Result<()> {
    for (name, ty) in PRIMITIVE_CODES {
        target.raw_set(*name, code_for(*ty))?;
    }
    target.raw_set("ARRAY", lua.create_function(make_array)?)?;

    let type_table = lua.create_table()?;
    type_table.raw_set("Array", lua.create_function(|lua, (_self, size, element): (LuaValue, i64, LuaValue)| {
        make_array(lua, (size, element))
    })?)?;
    target.raw_set("Type", type_table)?;
    Ok(())
}

/// The array-type marker produced by `ARRAY(n, T)` / `Type:Array(n, T)`,
/// consumed only by `TypeBuilder::__newindex`.
#[derive(Clone)]
struct ArraySpec {
    len: usize,
    element: TypeNode,
}

impl UserData for ArraySpec {}

fn make_array<'lua>(_lua: &'lua Lua, (size, element): (i64, LuaValue<'lua>)) -> mlua::Result<ArraySpec> {
    if size <= 0 {
        return Err(mlua::Error::RuntimeError(
            "Array size must be a positive integer!".to_string(),
        ));
    }
    let element_node = value_to_type_node(&element)?;
    let node = TypeNode::new_array(size as usize, element_node).map_err(to_lua_err)?;
    let TypeNode::Array(len, element) = node else {
        unreachable!("TypeNode::new_array always returns TypeNode::Array")
    };
    Ok(ArraySpec { len, element: *element })
}

/// Interprets a single assigned Lua value as a type declaration.
fn value_to_type_node(value: &LuaValue) -> mlua::Result<TypeNode> {
    match value {
        LuaValue::Integer(code) => type_for_code(*code)
            .map(TypeNode::Leaf)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("Unsupported type id '{code}'!"))),
        LuaValue::Number(code) => type_for_code(*code as i64)
            .map(TypeNode::Leaf)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("Unsupported type id '{code}'!"))),
        LuaValue::Table(table) => {
            let mut fields = Vec::new();
            for pair in table.clone().pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair?;
                let LuaValue::String(name) = key else {
                    return Err(mlua::Error::RuntimeError(
                        "Only strings supported as table key type!".to_string(),
                    ));
                };
                let node = value_to_type_node(&value)?;
                fields.push((name.to_str()?.to_string(), node));
            }
            TypeNode::new_struct(fields).map_err(to_lua_err)
        }
        LuaValue::UserData(ud) => {
            let spec = ud.borrow::<ArraySpec>()?;
            Ok(TypeNode::Array(spec.len, Box::new(spec.element.clone())))
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "Field has invalid type! Only primitive types, arrays and nested tables obeying the same rules are supported, got {}",
            other.type_name()
        ))),
    }
}

/// The schema-building proxy handed to an `interface()` body as `IN`/`OUT`
/// (or the single `inout` argument). Shares its field list with the
/// caller via `Rc<RefCell<..>>` (same idiom as `bridge::WrappedProperty`)
/// so the caller can read the finished fields back out after the Lua call
/// returns without needing to pull anything back out of the Lua userdata.
#[derive(Clone)]
pub struct TypeBuilder {
    fields: Rc<RefCell<Vec<(String, TypeNode)>>>,
}

impl TypeBuilder {
    fn new() -> (Self, Rc<RefCell<Vec<(String, TypeNode)>>>) {
        let fields = Rc::new(RefCell::new(Vec::new()));
        (Self { fields: fields.clone() }, fields)
    }
}

impl UserData for TypeBuilder {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::NewIndex, |_, this, (key, value): (String, LuaValue)| {
            let mut fields = this.fields.borrow_mut();
            if fields.iter().any(|(n, _)| n == &key) {
                return Err(mlua::Error::RuntimeError(format!(
                    "Property '{key}' already exists! Can't declare the same property twice!"
                )));
            }
            let node = value_to_type_node(&value)?;
            fields.push((key, node));
            Ok(())
        });
        methods.add_meta_method(MetaMethod::Index, |_, _, key: String| -> mlua::Result<LuaValue> {
            Err(mlua::Error::RuntimeError(format!(
                "Trying to access not available property '{key}' in interface!"
            )))
        });

        methods.add_method("__rl_len", |_, this, ()| Ok(this.fields.borrow().len()));
        methods.add_method("__rl_is_array", |_, _, ()| Ok(false));
        methods.add_method("__rl_next", |lua, this, key: LuaValue| {
            let fields = this.fields.borrow();
            let next_index = match key {
                LuaValue::Nil => 0usize,
                LuaValue::String(s) => {
                    let name = s.to_str()?.to_string();
                    fields.iter().position(|(n, _)| *n == name).map(|i| i + 1).ok_or_else(|| {
                        mlua::Error::RuntimeError(format!("__rl_next: unknown key '{name}'"))
                    })?
                }
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "__rl_next: unsupported key type '{}'",
                        other.type_name()
                    )))
                }
            };
            if next_index >= fields.len() {
                return Ok(mlua::MultiValue::from_vec(vec![LuaValue::Nil]));
            }
            let name = lua.create_string(&fields[next_index].0)?;
            Ok(mlua::MultiValue::from_vec(vec![LuaValue::String(name), LuaValue::Nil]))
        });
    }
}

/// Runs a two-argument `interface(IN, OUT)` script body and returns the
/// extracted input/output schemas.
pub fn extract_interface(
    lua: &Lua,
    interface_fn: mlua::Function,
) -> Result<(TypeNode, TypeNode), LogicError> {
    install_globals(lua, &lua.globals()).map_err(mlua_to_logic_err)?;
    let (in_builder, in_fields) = TypeBuilder::new();
    let (out_builder, out_fields) = TypeBuilder::new();
    interface_fn
        .call::<_, ()>((in_builder, out_builder))
        .map_err(mlua_to_logic_err)?;
    let in_type = TypeNode::new_struct(in_fields.borrow().clone())?;
    let out_type = TypeNode::new_struct(out_fields.borrow().clone())?;
    Ok((in_type, out_type))
}

/// Runs a single-argument `interface(inout)` body (Interface nodes): one
/// tree plays both roles.
pub fn extract_inout_interface(lua: &Lua, interface_fn: mlua::Function) -> Result<TypeNode, LogicError> {
    install_globals(lua, &lua.globals()).map_err(mlua_to_logic_err)?;
    let (builder, fields) = TypeBuilder::new();
    interface_fn.call::<_, ()>(builder).map_err(mlua_to_logic_err)?;
    TypeNode::new_struct(fields.borrow().clone())
}

fn mlua_to_logic_err(e: mlua::Error) -> LogicError {
    LogicError::LuaRuntimeError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_fields_extract_to_leaves() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(IN, OUT) IN.speed = FLOAT OUT.count = INT32 end")
            .eval::<mlua::Function>()
            .unwrap();
        let (in_type, out_type) = extract_interface(&lua, chunk).unwrap();
        assert_eq!(in_type, TypeNode::new_struct(vec![("speed".into(), TypeNode::Leaf(ValueType::Float))]).unwrap());
        assert_eq!(out_type, TypeNode::new_struct(vec![("count".into(), TypeNode::Leaf(ValueType::Int32))]).unwrap());
    }

    #[test]
    fn nested_table_extracts_to_struct() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(IN, OUT) IN.position = {x = FLOAT, y = FLOAT} end")
            .eval::<mlua::Function>()
            .unwrap();
        let (in_type, _) = extract_interface(&lua, chunk).unwrap();
        let TypeNode::Struct(fields) = in_type else { panic!("expected struct") };
        assert_eq!(fields[0].0, "position");
        assert!(matches!(fields[0].1, TypeNode::Struct(_)));
    }

    #[test]
    fn array_of_primitives_extracts_correctly() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(IN, OUT) IN.samples = ARRAY(4, FLOAT) end")
            .eval::<mlua::Function>()
            .unwrap();
        let (in_type, _) = extract_interface(&lua, chunk).unwrap();
        let TypeNode::Struct(fields) = in_type else { panic!("expected struct") };
        assert!(matches!(&fields[0].1, TypeNode::Array(4, elem) if matches!(**elem, TypeNode::Leaf(ValueType::Float))));
    }

    #[test]
    fn duplicate_field_declaration_errors() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(IN, OUT) IN.speed = FLOAT IN.speed = INT32 end")
            .eval::<mlua::Function>()
            .unwrap();
        assert!(extract_interface(&lua, chunk).is_err());
    }

    #[test]
    fn array_of_array_is_rejected() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(IN, OUT) IN.bad = ARRAY(2, ARRAY(2, FLOAT)) end")
            .eval::<mlua::Function>()
            .unwrap();
        assert!(extract_interface(&lua, chunk).is_err());
    }

    #[test]
    fn inout_interface_extracts_single_tree() {
        let lua = Lua::new();
        let chunk = lua
            .load("return function(inout) inout.value = FLOAT end")
            .eval::<mlua::Function>()
            .unwrap();
        let tree = extract_inout_interface(&lua, chunk).unwrap();
        assert!(matches!(tree, TypeNode::Struct(_)));
    }
}
