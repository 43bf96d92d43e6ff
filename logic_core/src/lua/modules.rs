//! Read-only wrapping of compiled Lua modules.
//!
//! A module compiles to a plain Lua table; before it is handed to a
//! dependent script it is wrapped (recursively, for nested tables) in a
//! proxy whose `__newindex` always errors. Grounded on the same
//! metatable-proxy idiom as the sandbox environment in `sandbox.rs`.

use mlua::{Lua, Table, Value};

/// Wraps `original` (and, recursively, every nested table it contains)
/// in a read-only proxy. `original`'s nested table fields are replaced
/// in place with their own wrapped proxies, so the returned wrapper's
/// `__index` can simply point at `original` itself.
pub fn wrap_module_readonly<'lua>(lua: &'lua Lua, original: Table<'lua>) -> mlua::Result<Table<'lua>> {
    for pair in original.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        if let Value::Table(nested) = value {
            let wrapped_nested = wrap_module_readonly(lua, nested)?;
            original.raw_set(key, wrapped_nested)?;
        }
    }

    let wrapper = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.raw_set("__index", original)?;
    meta.raw_set(
        "__newindex",
        lua.create_function(|_, _: mlua::MultiValue| -> mlua::Result<()> {
            Err(mlua::Error::RuntimeError(
                "Modifying module data is not allowed!".to_string(),
            ))
        })?,
    )?;
    wrapper.set_metatable(Some(meta));
    Ok(wrapper)
}
