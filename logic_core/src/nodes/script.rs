//! Script: the workhorse node kind. Compilation follows the seven-step
//! sequence fixed by `SPEC_FULL.md`'s Script section; `run()` invokes the
//! compiled closure with fresh `WrappedProperty` views every tick.
//!
//! Grounded on `original_source/lib/internals/LuaScriptHandler.cpp` for
//! the compile sequence and on `sandbox.rs`/`extractor.rs`/`bridge.rs`
//! for the mechanics each step delegates to.

use mlua::{Lua, RegistryKey, Value as LuaValue};

use crate::error::LogicError;
use crate::lua::bridge::WrappedProperty;
use crate::lua::extractor::{extract_interface, install_globals};
use crate::lua::sandbox::{ProtectionMode, SandboxEnv, StdModules};
use crate::nodes::deps::{build_global_table, cross_check_modules, extract_declared_modules};
use crate::nodes::module_node::ModuleNode;
use crate::ids::NodeId;
use crate::nodes::NodeHeader;
use crate::types::property::{PropertyTree, SemanticRole, TreeSide};
use std::cell::RefCell;
use std::rc::Rc;

/// A dependency a script declares by name via `modules(...)`, resolved
/// by the caller to an already-compiled `ModuleNode`.
pub struct ScriptConfig<'a> {
    pub std_modules: StdModules,
    pub resolved_modules: &'a [(&'a str, &'a ModuleNode)],
}

pub struct Script {
    pub header: NodeHeader,
    /// Original chunk text, kept so a save file can recompile this script
    /// on load rather than persist compiled Lua bytecode.
    pub source: String,
    pub declared_modules: Vec<String>,
    /// Each declared name's resolved module, by id -- `logic_format`
    /// replays these as the `modules` table a save file records.
    pub module_bindings: Vec<(String, NodeId)>,
    pub std_modules: StdModules,
    env: SandboxEnv,
    run_key: RegistryKey,
    pub input_tree: Rc<RefCell<PropertyTree>>,
    pub output_tree: Rc<RefCell<PropertyTree>>,
}

fn mlua_to_logic_err(e: mlua::Error) -> LogicError {
    LogicError::LuaRuntimeError(e.to_string())
}

impl Script {
    pub fn compile(lua: &Lua, header: NodeHeader, source: &str, config: ScriptConfig) -> Result<Self, LogicError> {
        // 1. Extract declared module dependencies from a throwaway state.
        let declared_modules = extract_declared_modules(source, &header.name)?;
        // 2. Cross-check against what the caller actually provided.
        let provided_names: Vec<String> = config.resolved_modules.iter().map(|(name, _)| name.to_string()).collect();
        cross_check_modules(&declared_modules, &provided_names)?;

        // 3. Load the real chunk in `LoadScript` mode.
        let env = SandboxEnv::new(lua, config.std_modules).map_err(mlua_to_logic_err)?;
        let env_table = env.table(lua).map_err(mlua_to_logic_err)?;
        // The type-id constants (FLOAT, INT32, ARRAY, ...) are raw entries
        // on the env table itself, not read through its gated metatable,
        // so `interface()` can see them under every protection mode.
        install_globals(lua, &env_table).map_err(mlua_to_logic_err)?;
        let global_table = build_global_table(lua, &declared_modules, config.resolved_modules).map_err(mlua_to_logic_err)?;
        env.put_sensitive(lua, "GLOBAL", LuaValue::Table(global_table)).map_err(mlua_to_logic_err)?;

        {
            let _guard = env.enter(ProtectionMode::LoadScript);
            lua.load(source)
                .set_name(&header.name)
                .set_environment(env.table(lua).map_err(mlua_to_logic_err)?)
                .exec()
                .map_err(mlua_to_logic_err)?;
        }

        // 4. `interface` and `run` are mandatory; `init` is optional.
        if !env.has_declared("interface") || !env.has_declared("run") {
            return Err(LogicError::IllegalArgument(format!(
                "script '{}' must declare both interface() and run()",
                header.name
            )));
        }

        // 5. Run init() in InitFunction mode, if declared.
        if env.has_declared("init") {
            let init_fn = env
                .declared_function(lua, "init")
                .map_err(mlua_to_logic_err)?
                .expect("has_declared checked init exists");
            let _guard = env.enter(ProtectionMode::InitFunction);
            init_fn.call::<_, ()>(()).map_err(mlua_to_logic_err)?;
        }

        // 6. Extract the interface schema with schema-building proxies.
        let interface_fn = env
            .declared_function(lua, "interface")
            .map_err(mlua_to_logic_err)?
            .expect("has_declared checked interface exists");
        let (in_type, out_type) = {
            let _guard = env.enter(ProtectionMode::InterfaceFunction);
            extract_interface(lua, interface_fn)?
        };
        let input_tree = Rc::new(RefCell::new(PropertyTree::from_schema(&in_type, SemanticRole::ScriptInput)));
        let output_tree = Rc::new(RefCell::new(PropertyTree::from_schema(&out_type, SemanticRole::ScriptOutput)));

        // 7. Keep the compiled run closure and leave the environment in
        // RunFunction mode for the rest of this script's life.
        let run_fn = env
            .declared_function(lua, "run")
            .map_err(mlua_to_logic_err)?
            .expect("has_declared checked run exists");
        let run_key = lua.create_registry_value(run_fn).map_err(mlua_to_logic_err)?;
        env.set_mode(ProtectionMode::RunFunction);

        let module_bindings = config.resolved_modules.iter().map(|(name, m)| (name.to_string(), m.header.id)).collect();
        let std_modules = config.std_modules;

        Ok(Self {
            header,
            source: source.to_string(),
            declared_modules,
            module_bindings,
            std_modules,
            env,
            run_key,
            input_tree,
            output_tree,
        })
    }

    pub fn run(&mut self, lua: &Lua) -> Result<(), LogicError> {
        let run_fn: mlua::Function = lua.registry_value(&self.run_key).map_err(mlua_to_logic_err)?;
        let in_wrapped = WrappedProperty::new(self.input_tree.clone(), PropertyTree::ROOT, TreeSide::Input);
        let out_wrapped = WrappedProperty::new(self.output_tree.clone(), PropertyTree::ROOT, TreeSide::Output);
        run_fn.call::<_, ()>((in_wrapped, out_wrapped)).map_err(mlua_to_logic_err)
    }

    pub fn current_mode(&self) -> ProtectionMode {
        self.env.current_mode()
    }
}
