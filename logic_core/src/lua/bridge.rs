//! `WrappedProperty`: the userdata view a running script sees for `IN`
//! and `OUT`.
//!
//! Grounded on `original_source/lib/internals/LuaScriptHandler.cpp` for
//! the indexing/type-check error wording, and on the `RegistryKey`/`Rc`
//! sharing idiom already used in `sandbox.rs` -- a `WrappedProperty`
//! shares ownership of its node's tree (`Rc<RefCell<PropertyTree>>`)
//! rather than borrowing it for a scoped lifetime, so it can be handed to
//! `mlua::create_function` and stashed in Lua tables without a `'lua`
//! parameter threaded through the engine's node types.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, MetaMethod, UserData, UserDataMethods, Value as LuaValue};

use crate::types::property::{PropertyIndex, PropertyTree, TreeSide};
use crate::types::value::{Value, ValueType};

/// A live view into one node's property subtree, rooted at `index`.
///
/// `side` gates writability: `Input` is read-only from Lua (a script
/// reads `IN` but never writes it); `Output`/`Interface` accept writes
/// routed through `PropertyTree::set_internal` (the link graph, not the
/// API role gate, is what matters for these writes).
#[derive(Clone)]
pub struct WrappedProperty {
    tree: Rc<RefCell<PropertyTree>>,
    index: PropertyIndex,
    side: TreeSide,
}

impl WrappedProperty {
    pub fn new(tree: Rc<RefCell<PropertyTree>>, index: PropertyIndex, side: TreeSide) -> Self {
        Self { tree, index, side }
    }

    fn child_named(&self, name: &str) -> Option<WrappedProperty> {
        let tree = self.tree.borrow();
        let idx = tree.child_by_name(self.index, name)?;
        Some(WrappedProperty::new(self.tree.clone(), idx, self.side))
    }

    fn child_at(&self, one_based: i64) -> Option<WrappedProperty> {
        if one_based < 1 {
            return None;
        }
        let tree = self.tree.borrow();
        let idx = tree.child_by_index(self.index, (one_based - 1) as usize)?;
        Some(WrappedProperty::new(self.tree.clone(), idx, self.side))
    }

    fn to_lua<'lua>(&self, lua: &'lua Lua) -> mlua::Result<LuaValue<'lua>> {
        let tree = self.tree.borrow();
        let prop = tree.get_prop(self.index);
        if prop.value_type.is_leaf() {
            return value_to_lua(lua, prop.value.as_ref());
        }
        drop(tree);
        lua.create_userdata(self.clone()).map(LuaValue::UserData)
    }

    fn own_type(&self) -> ValueType {
        self.tree.borrow().get_prop(self.index).value_type
    }

    fn lookup_child(&self, key: &LuaValue) -> mlua::Result<WrappedProperty> {
        let own_type = self.own_type();
        match key {
            LuaValue::String(s) => {
                if own_type == ValueType::Array {
                    return Err(mlua::Error::RuntimeError(
                        "Invalid index access! String index used on an Array property, use an integer instead!"
                            .to_string(),
                    ));
                }
                self.child_named(s.to_str()?)
            }
            LuaValue::Integer(i) => {
                if own_type == ValueType::Struct {
                    return Err(mlua::Error::RuntimeError(
                        "Invalid index access! Integer index used on a Struct property, use a field name instead!"
                            .to_string(),
                    ));
                }
                self.child_at(*i)
            }
            LuaValue::Number(_) => {
                if own_type == ValueType::Struct {
                    return Err(mlua::Error::RuntimeError(
                        "Invalid index access! Integer index used on a Struct property, use a field name instead!"
                            .to_string(),
                    ));
                }
                let idx = crate::lua::conversions::extract_index(key)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
                self.child_at(idx as i64)
            }
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "Only strings and integers supported as property index type, got {}",
                    other.type_name()
                )))
            }
        }
        .ok_or_else(|| {
            mlua::Error::RuntimeError("Trying to access not available property in object!".to_string())
        })
    }

    fn read_field<'lua>(&self, lua: &'lua Lua, key: &LuaValue) -> mlua::Result<LuaValue<'lua>> {
        self.lookup_child(key)?.to_lua(lua)
    }

    fn write_field(&self, key: &LuaValue, new_value: LuaValue) -> mlua::Result<()> {
        if self.side == TreeSide::Input {
            return Err(mlua::Error::RuntimeError(
                "Invalid index access in IN object! IN values can't be overwritten, use OUT instead!".to_string(),
            ));
        }
        self.lookup_child(key)?.write_self(new_value)
    }

    /// Writes a leaf value directly, or deep-writes every matching field
    /// of a struct from a Lua table.
    fn write_self(&self, new_value: LuaValue) -> mlua::Result<()> {
        let prop_type = self.own_type();
        if prop_type == ValueType::Struct {
            let LuaValue::Table(table) = new_value else {
                return Err(mlua::Error::RuntimeError(
                    "Assigning a Struct property requires a table of its fields!".to_string(),
                ));
            };
            for pair in table.pairs::<String, LuaValue>() {
                let (field, value) = pair?;
                let child = self.child_named(&field).ok_or_else(|| {
                    mlua::Error::RuntimeError(format!(
                        "Unknown field '{field}' in struct assignment!"
                    ))
                })?;
                child.write_self(value)?;
            }
            return Ok(());
        }
        if prop_type == ValueType::Array {
            return Err(mlua::Error::RuntimeError(
                "Assigning a whole Array at once is not supported, assign its elements individually!"
                    .to_string(),
            ));
        }
        let mut tree = self.tree.borrow_mut();
        let value = lua_to_value(prop_type, &new_value)?;
        tree.set_internal(self.index, value)
            .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
        Ok(())
    }

    fn is_array(&self) -> bool {
        let tree = self.tree.borrow();
        tree.get_prop(self.index).value_type == ValueType::Array
    }

    fn child_count(&self) -> usize {
        let tree = self.tree.borrow();
        tree.child_count(self.index)
    }
}

fn value_to_lua<'lua>(lua: &'lua Lua, value: Option<&Value>) -> mlua::Result<LuaValue<'lua>> {
    Ok(match value {
        None => LuaValue::Nil,
        Some(Value::Bool(b)) => LuaValue::Boolean(*b),
        Some(Value::Int32(i)) => LuaValue::Integer(*i as i64),
        Some(Value::Int64(i)) => LuaValue::Integer(*i),
        Some(Value::Float(f)) => LuaValue::Number(*f as f64),
        Some(Value::String(s)) => LuaValue::String(lua.create_string(s)?),
        Some(Value::Vec2f(v)) => vec_to_table(lua, v, |f| LuaValue::Number(f as f64))?,
        Some(Value::Vec3f(v)) => vec_to_table(lua, v, |f| LuaValue::Number(f as f64))?,
        Some(Value::Vec4f(v)) => vec_to_table(lua, v, |f| LuaValue::Number(f as f64))?,
        Some(Value::Vec2i(v)) => vec_to_table(lua, v, |i| LuaValue::Integer(i as i64))?,
        Some(Value::Vec3i(v)) => vec_to_table(lua, v, |i| LuaValue::Integer(i as i64))?,
        Some(Value::Vec4i(v)) => vec_to_table(lua, v, |i| LuaValue::Integer(i as i64))?,
    })
}

fn vec_to_table<'lua, T: Copy>(
    lua: &'lua Lua,
    components: &[T],
    to_lua: impl Fn(T) -> LuaValue<'lua>,
) -> mlua::Result<LuaValue<'lua>> {
    let table = lua.create_table()?;
    for (i, c) in components.iter().enumerate() {
        table.raw_set(i + 1, to_lua(*c))?;
    }
    Ok(LuaValue::Table(table))
}

fn lua_to_value(ty: ValueType, v: &LuaValue) -> mlua::Result<Value> {
    use crate::lua::conversions::{extract_f32, extract_i32, extract_i64};
    let type_err = |found: &str| {
        mlua::Error::RuntimeError(format!("type mismatch: expected {ty}, found {found}"))
    };
    match ty {
        ValueType::Bool => match v {
            LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
            other => Err(type_err(other.type_name())),
        },
        ValueType::Int32 => extract_i32(v).map(Value::Int32).map_err(|e| mlua::Error::RuntimeError(e.to_string())),
        ValueType::Int64 => extract_i64(v).map(Value::Int64).map_err(|e| mlua::Error::RuntimeError(e.to_string())),
        ValueType::Float => extract_f32(v).map(Value::Float).map_err(|e| mlua::Error::RuntimeError(e.to_string())),
        ValueType::String => match v {
            LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
            other => Err(type_err(other.type_name())),
        },
        ValueType::Vec2f | ValueType::Vec3f | ValueType::Vec4f => {
            let n = ty.vector_len().unwrap();
            let components = table_components(v, n, extract_f32)?;
            Ok(match n {
                2 => Value::Vec2f([components[0], components[1]]),
                3 => Value::Vec3f([components[0], components[1], components[2]]),
                _ => Value::Vec4f([components[0], components[1], components[2], components[3]]),
            })
        }
        ValueType::Vec2i | ValueType::Vec3i | ValueType::Vec4i => {
            let n = ty.vector_len().unwrap();
            let components = table_components(v, n, extract_i32)?;
            Ok(match n {
                2 => Value::Vec2i([components[0], components[1]]),
                3 => Value::Vec3i([components[0], components[1], components[2]]),
                _ => Value::Vec4i([components[0], components[1], components[2], components[3]]),
            })
        }
        ValueType::Struct | ValueType::Array => unreachable!("leaf-only conversion"),
    }
}

fn table_components<T: Default + Copy>(
    v: &LuaValue,
    count: usize,
    extract: impl Fn(&LuaValue) -> Result<T, crate::error::LogicError>,
) -> mlua::Result<Vec<T>> {
    let LuaValue::Table(t) = v else {
        return Err(mlua::Error::RuntimeError(format!(
            "expected a table with {count} numeric components, found {}",
            v.type_name()
        )));
    };
    let mut out = vec![T::default(); count];
    for i in 0..count {
        let component: LuaValue = t.raw_get(i + 1)?;
        out[i] = extract(&component).map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
    }
    Ok(out)
}

impl UserData for WrappedProperty {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: LuaValue| {
            this.read_field(lua, &key)
        });
        methods.add_meta_method(MetaMethod::NewIndex, |_, this, (key, value): (LuaValue, LuaValue)| {
            this.write_field(&key, value)
        });
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.child_count()));

        methods.add_method("__rl_len", |_, this, ()| Ok(this.child_count()));
        methods.add_method("__rl_is_array", |_, this, ()| Ok(this.is_array()));
        methods.add_method("__rl_index", |lua, this, one_based: i64| {
            match this.child_at(one_based) {
                Some(child) => child.to_lua(lua),
                None => Ok(LuaValue::Nil),
            }
        });
        methods.add_method("__rl_next", |lua, this, key: LuaValue| {
            let next_index = match key {
                LuaValue::Nil => 1i64,
                LuaValue::Integer(i) => i + 1,
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "__rl_next: unsupported key type '{}'",
                        other.type_name()
                    )))
                }
            };
            if (next_index as usize) > this.child_count() {
                return Ok(mlua::MultiValue::from_vec(vec![LuaValue::Nil]));
            }
            let child = this.child_at(next_index).expect("index within bounds");
            let value = child.to_lua(lua)?;
            Ok(mlua::MultiValue::from_vec(vec![LuaValue::Integer(next_index), value]))
        });
    }
}
