//! Custom iteration helpers `rl_len`, `rl_next`, `rl_pairs`, `rl_ipairs`
//! installed once per `ScriptHost`.
//!
//! They transparently operate on plain Lua tables (module return values)
//! and on the engine's userdata wrappers (`WrappedProperty`, the type
//! extractor proxy) by dispatching on the Lua value's type and, for
//! userdata, calling a small fixed set of hidden methods (`__rl_len`,
//! `__rl_next`, `__rl_index`, `__rl_is_array`) that each userdata type
//! implements.

use mlua::{Lua, MultiValue, Value};

pub fn install(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    globals.set("rl_len", lua.create_function(rl_len)?)?;
    globals.set("rl_next", lua.create_function(rl_next)?)?;
    globals.set("rl_pairs", lua.create_function(rl_pairs)?)?;
    globals.set("rl_ipairs", lua.create_function(rl_ipairs)?)?;
    Ok(())
}

fn rl_len(_lua: &Lua, value: Value) -> mlua::Result<usize> {
    match value {
        Value::Table(t) => Ok(t.raw_len()),
        Value::UserData(ud) => ud.call_method("__rl_len", ()),
        other => Err(mlua::Error::RuntimeError(format!(
            "rl_len: unsupported container type '{}'",
            other.type_name()
        ))),
    }
}

fn rl_next<'lua>(
    lua: &'lua Lua,
    (container, key): (Value<'lua>, Value<'lua>),
) -> mlua::Result<MultiValue<'lua>> {
    match container {
        Value::Table(t) => {
            let next: mlua::Function = lua.globals().get("next")?;
            next.call((t, key))
        }
        Value::UserData(ud) => ud.call_method("__rl_next", key),
        other => Err(mlua::Error::RuntimeError(format!(
            "rl_next: unsupported container type '{}'",
            other.type_name()
        ))),
    }
}

fn rl_pairs<'lua>(
    lua: &'lua Lua,
    container: Value<'lua>,
) -> mlua::Result<(mlua::Function<'lua>, Value<'lua>, Value<'lua>)> {
    let iter_fn: mlua::Function = lua.globals().get("rl_next")?;
    Ok((iter_fn, container, Value::Nil))
}

fn rl_ipairs<'lua>(
    lua: &'lua Lua,
    container: Value<'lua>,
) -> mlua::Result<(mlua::Function<'lua>, Value<'lua>, Value<'lua>)> {
    match &container {
        Value::Table(_) => {}
        Value::UserData(ud) => {
            let is_array: bool = ud.call_method("__rl_is_array", ())?;
            if !is_array {
                return Err(mlua::Error::RuntimeError(
                    "rl_ipairs: struct inputs cannot be iterated with rl_ipairs".into(),
                ));
            }
        }
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "rl_ipairs: unsupported container type '{}'",
                other.type_name()
            )))
        }
    }
    let iter_fn = lua.create_function(ipairs_step)?;
    Ok((iter_fn, container, Value::Integer(0)))
}

fn ipairs_step<'lua>(
    _lua: &'lua Lua,
    (container, index): (Value<'lua>, i64),
) -> mlua::Result<MultiValue<'lua>> {
    let next_index = index + 1;
    let value = match container {
        Value::Table(t) => t.raw_get(next_index)?,
        Value::UserData(ud) => ud.call_method("__rl_index", next_index)?,
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "rl_ipairs: unsupported container type '{}'",
                other.type_name()
            )))
        }
    };
    if matches!(value, Value::Nil) {
        Ok(MultiValue::from_vec(vec![Value::Nil]))
    } else {
        Ok(MultiValue::from_vec(vec![Value::Integer(next_index), value]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    #[test]
    fn rl_len_matches_table_length() {
        let lua = Lua::new();
        install(&lua).unwrap();
        lua.load("t = {11, 12, 13}").exec().unwrap();
        let n: usize = lua.load("return rl_len(t)").eval().unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn rl_ipairs_iterates_in_order() {
        let lua = Lua::new();
        install(&lua).unwrap();
        lua.load("t = {11, 12}").exec().unwrap();
        let result: Vec<i64> = lua
            .load("local out = {} for i, v in rl_ipairs(t) do out[#out+1] = v end return out")
            .eval()
            .unwrap();
        assert_eq!(result, vec![11, 12]);
    }
}
