//! `ScriptHost`: the single process-wide-per-engine Lua state, the
//! five sandbox protection modes, and the scoped mode guard.
//!
//! Grounded on `original_source/lib/internals/EnvironmentProtection.cpp`:
//! a metatable's `__index`/`__newindex` are swapped per phase there (one
//! pair of functions per mode); here a single pair of closures consults a
//! shared `Rc<RefCell<ProtectionMode>>` instead, which is equivalent and
//! avoids re-registering functions on every phase transition. Long-lived
//! Lua values are kept behind `mlua::RegistryKey`s and re-fetched through
//! the callback's own `&Lua` handle, the same way `grim_engine::lua_host`
//! stashes its `system` table as an `Rc<RegistryKey>` across callbacks.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use mlua::{Lua, LuaOptions, RegistryKey, StdLib, Table, Value};

use crate::error::LogicError;
use crate::lua::iter_helpers;

/// Which standard libraries a script's environment may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StdModules {
    pub base: bool,
    pub string: bool,
    pub table: bool,
    pub math: bool,
    pub debug: bool,
}

impl StdModules {
    pub const ALL: StdModules = StdModules {
        base: true,
        string: true,
        table: true,
        math: true,
        debug: true,
    };
    pub const NONE: StdModules = StdModules {
        base: false,
        string: false,
        table: false,
        math: false,
        debug: false,
    };
}

/// The five protection modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    LoadScript,
    InitFunction,
    InterfaceFunction,
    RunFunction,
    Module,
}

/// The single Lua state owned by one engine instance: a Lua state is not
/// shared process-wide, every engine instance owns one.
pub struct ScriptHost {
    lua: Lua,
}

impl ScriptHost {
    pub fn new() -> Result<Self, LogicError> {
        let lua = Lua::new_with(
            StdLib::BASE | StdLib::STRING | StdLib::MATH | StdLib::TABLE | StdLib::DEBUG,
            LuaOptions::default(),
        )
        .map_err(|e| LogicError::LuaRuntimeError(e.to_string()))?;
        iter_helpers::install(&lua).map_err(|e| LogicError::LuaRuntimeError(e.to_string()))?;
        Ok(Self { lua })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

fn require_string_key(key: &Value) -> mlua::Result<String> {
    match key {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        other => Err(mlua::Error::RuntimeError(format!(
            "Assigning global variables with a non-string index is prohibited! (key type used '{}')",
            other.type_name()
        ))),
    }
}

/// A script/interface/module's sandboxed `_ENV` table plus its hidden
/// backing store. Both tables live in the Lua
/// registry; `table()`/`get_sensitive()` re-fetch a fresh borrow each
/// call rather than holding one across the object's lifetime.
pub struct SandboxEnv {
    table_key: RegistryKey,
    sensitive_key: RegistryKey,
    mode: Rc<RefCell<ProtectionMode>>,
    declared_fns: Rc<RefCell<BTreeSet<String>>>,
}

impl SandboxEnv {
    pub fn new(lua: &Lua, std_modules: StdModules) -> mlua::Result<Self> {
        let env = lua.create_table()?;
        let sensitive = lua.create_table()?;
        let globals = lua.globals();

        if std_modules.base {
            for name in [
                "print", "pairs", "ipairs", "next", "tostring", "tonumber", "error", "assert",
                "type", "select", "rawget", "rawset", "rawequal", "setmetatable", "getmetatable",
                "rl_len", "rl_next", "rl_pairs", "rl_ipairs",
            ] {
                if let Ok(v) = globals.get::<_, Value>(name) {
                    env.raw_set(name, v)?;
                }
            }
        }
        for (flag, name) in [
            (std_modules.string, "string"),
            (std_modules.table, "table"),
            (std_modules.math, "math"),
            (std_modules.debug, "debug"),
        ] {
            if flag {
                env.raw_set(name, globals.get::<_, Value>(name)?)?;
            }
        }

        let mode = Rc::new(RefCell::new(ProtectionMode::LoadScript));
        let declared_fns = Rc::new(RefCell::new(BTreeSet::new()));

        let sensitive_key = lua.create_registry_value(sensitive)?;
        let sensitive_key_for_index = Rc::new(sensitive_key);

        let meta = lua.create_table()?;
        meta.raw_set(
            "__index",
            make_index_fn(lua, sensitive_key_for_index.clone(), mode.clone())?,
        )?;
        meta.raw_set(
            "__newindex",
            make_newindex_fn(
                lua,
                sensitive_key_for_index.clone(),
                mode.clone(),
                declared_fns.clone(),
            )?,
        )?;
        env.set_metatable(Some(meta));

        let table_key = lua.create_registry_value(env)?;
        // Reclaim the Rc so the struct owns a plain RegistryKey; the Rc
        // only existed so both closures could share it during setup.
        let sensitive_key = Rc::try_unwrap(sensitive_key_for_index)
            .unwrap_or_else(|rc| panic!("sensitive key still shared by {} closures", Rc::strong_count(&rc)));

        Ok(Self {
            table_key,
            sensitive_key,
            mode,
            declared_fns,
        })
    }

    pub fn table<'lua>(&self, lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
        lua.registry_value(&self.table_key)
    }

    fn sensitive<'lua>(&self, lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
        lua.registry_value(&self.sensitive_key)
    }

    /// Scoped acquire/release of a protection mode: every mode entry has
    /// a matching exit on all control-flow paths, including error.
    pub fn enter(&self, mode: ProtectionMode) -> ModeGuard {
        let previous = *self.mode.borrow();
        *self.mode.borrow_mut() = mode;
        ModeGuard {
            mode: self.mode.clone(),
            previous,
        }
    }

    pub fn current_mode(&self) -> ProtectionMode {
        *self.mode.borrow()
    }

    /// Unguarded, permanent mode transition -- used once compilation
    /// finishes to leave a script's environment in `RunFunction` mode for
    /// the rest of its life, rather than restoring on drop.
    pub fn set_mode(&self, mode: ProtectionMode) {
        *self.mode.borrow_mut() = mode;
    }

    pub fn put_sensitive(&self, lua: &Lua, key: &str, value: Value<'_>) -> mlua::Result<()> {
        self.sensitive(lua)?.raw_set(key, value)
    }

    pub fn get_sensitive<'lua>(&self, lua: &'lua Lua, key: &str) -> mlua::Result<Value<'lua>> {
        self.sensitive(lua)?.raw_get(key)
    }

    pub fn declared_function<'lua>(
        &self,
        lua: &'lua Lua,
        name: &str,
    ) -> mlua::Result<Option<mlua::Function<'lua>>> {
        let v: Value = self.sensitive(lua)?.raw_get(name)?;
        Ok(match v {
            Value::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn has_declared(&self, name: &str) -> bool {
        self.declared_fns.borrow().contains(name)
    }
}

/// RAII guard restoring the previous protection mode on drop, including
/// the error/unwind path.
pub struct ModeGuard {
    mode: Rc<RefCell<ProtectionMode>>,
    previous: ProtectionMode,
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        *self.mode.borrow_mut() = self.previous;
    }
}

fn make_index_fn(
    lua: &Lua,
    sensitive_key: Rc<RegistryKey>,
    mode: Rc<RefCell<ProtectionMode>>,
) -> mlua::Result<mlua::Function> {
    lua.create_function(move |lua, (_tbl, key): (Table, Value)| -> mlua::Result<Value> {
        let key_str = require_string_key(&key)?;
        let current = *mode.borrow();
        let allowed = match current {
            ProtectionMode::LoadScript => key_str == "modules",
            ProtectionMode::InitFunction => key_str == "GLOBAL",
            ProtectionMode::InterfaceFunction | ProtectionMode::RunFunction => {
                matches!(key_str.as_str(), "GLOBAL" | "IN" | "OUT")
            }
            ProtectionMode::Module => key_str == "GLOBAL",
        };
        if !allowed {
            return Err(mlua::Error::RuntimeError(format!(
                "Trying to read global variable '{key_str}' outside the scope of init(), interface() and run() functions! This can cause undefined behavior and is forbidden!"
            )));
        }
        let sensitive: Table = lua.registry_value(&sensitive_key)?;
        sensitive.raw_get(key_str)
    })
}

fn make_newindex_fn(
    lua: &Lua,
    sensitive_key: Rc<RegistryKey>,
    mode: Rc<RefCell<ProtectionMode>>,
    declared_fns: Rc<RefCell<BTreeSet<String>>>,
) -> mlua::Result<mlua::Function> {
    lua.create_function(
        move |lua, (_tbl, key, value): (Table, Value, Value)| -> mlua::Result<()> {
            let key_str = require_string_key(&key)?;
            let current = *mode.borrow();
            match current {
                ProtectionMode::LoadScript => {
                    if !matches!(value, Value::Function(_)) {
                        return Err(mlua::Error::RuntimeError(format!(
                            "Declaring global variables is forbidden (exceptions: the functions 'init', 'interface' and 'run')! (found value of type '{}')",
                            value.type_name()
                        )));
                    }
                    if !matches!(key_str.as_str(), "init" | "interface" | "run") {
                        return Err(mlua::Error::RuntimeError(format!(
                            "Unexpected function name '{key_str}'! Allowed names: 'init', 'interface', 'run'"
                        )));
                    }
                    if !declared_fns.borrow_mut().insert(key_str.clone()) {
                        return Err(mlua::Error::RuntimeError(format!(
                            "Function '{key_str}' can only be declared once!"
                        )));
                    }
                    let sensitive: Table = lua.registry_value(&sensitive_key)?;
                    sensitive.raw_set(key_str, value)
                }
                ProtectionMode::InitFunction => {
                    if key_str == "GLOBAL" {
                        Err(mlua::Error::RuntimeError(
                            "Trying to override the GLOBAL table in init()! You can only add data, but not overwrite the table!".to_string(),
                        ))
                    } else {
                        Err(mlua::Error::RuntimeError(format!(
                            "Unexpected global variable definition '{key_str}' in init()! Please use the GLOBAL table to declare global data and functions, or use modules!"
                        )))
                    }
                }
                ProtectionMode::InterfaceFunction => Err(mlua::Error::RuntimeError(format!(
                    "Trying to declare global variable '{key_str}' in interface()! This is forbidden!"
                ))),
                ProtectionMode::RunFunction => Err(mlua::Error::RuntimeError(format!(
                    "Trying to declare global variable '{key_str}' in run()! This is forbidden!"
                ))),
                ProtectionMode::Module => Err(mlua::Error::RuntimeError(format!(
                    "Trying to declare global variable '{key_str}' in a module! This is forbidden!"
                ))),
            }
        },
    )
}
