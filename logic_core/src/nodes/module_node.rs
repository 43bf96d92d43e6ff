//! Module: compiles to a single read-only Lua table, shared by whatever
//! scripts declare a dependency on it.
//!
//! Grounded on `original_source/lib/internals/SolState.cpp` for the
//! "compile, require a table result, wrap read-only" sequence, and on
//! `lua::modules::wrap_module_readonly` for the wrapping itself.

use mlua::{Lua, Value as LuaValue};

use crate::error::LogicError;
use crate::ids::NodeId;
use crate::lua::modules::wrap_module_readonly;
use crate::lua::sandbox::{ProtectionMode, SandboxEnv, StdModules};
use crate::nodes::deps::{build_global_table, cross_check_modules, extract_declared_modules};
use crate::nodes::NodeHeader;

pub struct ModuleNode {
    pub header: NodeHeader,
    /// Original chunk text, kept for the same reason `Script` keeps one.
    pub source: String,
    pub declared_modules: Vec<String>,
    pub module_bindings: Vec<(String, NodeId)>,
    pub std_modules: StdModules,
    table_key: mlua::RegistryKey,
}

impl ModuleNode {
    /// Compiles `source` as a module chunk: it must return a table, which
    /// is then wrapped read-only (recursively). `resolved_modules` are the
    /// already-compiled modules this one may itself depend on, injected
    /// under `GLOBAL.<name>` exactly as a script's dependencies are.
    pub fn compile(
        lua: &Lua,
        header: NodeHeader,
        source: &str,
        std_modules: StdModules,
        resolved_modules: &[(&str, &ModuleNode)],
    ) -> Result<Self, LogicError> {
        let declared_modules = extract_declared_modules(source, &header.name)?;
        let provided_names: Vec<String> = resolved_modules.iter().map(|(name, _)| name.to_string()).collect();
        cross_check_modules(&declared_modules, &provided_names)?;

        let env = SandboxEnv::new(lua, std_modules).map_err(mlua_to_logic_err)?;
        if !declared_modules.is_empty() {
            let global_table = build_global_table(lua, &declared_modules, resolved_modules).map_err(mlua_to_logic_err)?;
            env.put_sensitive(lua, "GLOBAL", LuaValue::Table(global_table)).map_err(mlua_to_logic_err)?;
        }
        let guard = env.enter(ProtectionMode::Module);
        let result: LuaValue = lua
            .load(source)
            .set_name(&header.name)
            .set_environment(env.table(lua).map_err(mlua_to_logic_err)?)
            .eval()
            .map_err(mlua_to_logic_err)?;
        drop(guard);

        let LuaValue::Table(table) = result else {
            return Err(LogicError::IllegalArgument(format!(
                "module '{}' must return a table, found {}",
                header.name,
                result.type_name()
            )));
        };
        let wrapped = wrap_module_readonly(lua, table).map_err(mlua_to_logic_err)?;
        let table_key = lua.create_registry_value(wrapped).map_err(mlua_to_logic_err)?;
        let module_bindings = resolved_modules.iter().map(|(name, m)| (name.to_string(), m.header.id)).collect();
        Ok(Self { header, source: source.to_string(), declared_modules, module_bindings, std_modules, table_key })
    }

    pub fn table<'lua>(&self, lua: &'lua Lua) -> mlua::Result<mlua::Table<'lua>> {
        lua.registry_value(&self.table_key)
    }
}

fn mlua_to_logic_err(e: mlua::Error) -> LogicError {
    LogicError::LuaRuntimeError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    #[test]
    fn module_returning_a_table_compiles_and_is_read_only() {
        let lua = Lua::new();
        let node = ModuleNode::compile(
            &lua,
            NodeHeader::new(NodeId(1), "consts".into()),
            "return {speed = 10}",
            StdModules::ALL,
            &[],
        )
        .unwrap();
        let table = node.table(&lua).unwrap();
        let speed: i64 = table.get("speed").unwrap();
        assert_eq!(speed, 10);
        lua.globals().set("m", table).unwrap();
        assert!(lua.load("m.speed = 20").exec().is_err());
    }

    #[test]
    fn module_not_returning_a_table_is_rejected() {
        let lua = Lua::new();
        let err = ModuleNode::compile(
            &lua,
            NodeHeader::new(NodeId(1), "bad".into()),
            "return 5",
            StdModules::ALL,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, LogicError::IllegalArgument(_)));
    }

    #[test]
    fn module_depending_on_unprovided_name_is_rejected() {
        let lua = Lua::new();
        let err = ModuleNode::compile(
            &lua,
            NodeHeader::new(NodeId(1), "dependent".into()),
            "modules('missing') return {}",
            StdModules::ALL,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, LogicError::UnknownModule(_)));
    }
}
