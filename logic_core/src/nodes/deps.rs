//! Module-dependency declaration, shared by `Script` and `Module`
//! compilation.
//!
//! Grounded on the compilation sequence in `SPEC_FULL.md`'s Script
//! section: a throwaway Lua state runs the chunk with a stubbed
//! `modules(...)` so the real load can cross-check and inject the named
//! dependencies before anything in the chunk actually executes for real.

use mlua::{Lua, Table, Variadic};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::nodes::module_node::ModuleNode;

fn to_logic_err(e: mlua::Error) -> LogicError {
    LogicError::LuaRuntimeError(e.to_string())
}

/// Runs `source` in a fresh, unsandboxed Lua state whose only observable
/// effect we read back is the argument list of at most one `modules(...)`
/// call. Everything else the chunk does (declaring `interface`/`init`/
/// `run` as globals, for instance) is harmless here -- the state is
/// discarded once this returns.
pub fn extract_declared_modules(source: &str, chunk_name: &str) -> Result<Vec<String>, LogicError> {
    let scratch = Lua::new();
    let declared: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let called = Rc::new(RefCell::new(false));
    let declared_for_closure = declared.clone();
    let called_for_closure = called.clone();

    let stub = scratch
        .create_function(move |_, names: Variadic<String>| {
            if *called_for_closure.borrow() {
                return Err(mlua::Error::RuntimeError(
                    "modules(...) can only be called once".to_string(),
                ));
            }
            *called_for_closure.borrow_mut() = true;
            let mut seen = std::collections::BTreeSet::new();
            for name in names.iter() {
                if !seen.insert(name.clone()) {
                    return Err(mlua::Error::RuntimeError(format!(
                        "duplicate module dependency '{name}'"
                    )));
                }
            }
            *declared_for_closure.borrow_mut() = names.to_vec();
            Ok(())
        })
        .map_err(to_logic_err)?;
    scratch.globals().set("modules", stub).map_err(to_logic_err)?;
    scratch
        .load(source)
        .set_name(chunk_name)
        .exec()
        .map_err(|e| LogicError::LuaSyntaxError(e.to_string()))?;

    let declared = Rc::try_unwrap(declared)
        .unwrap_or_else(|rc| panic!("declared-modules cell still shared by {} owners", Rc::strong_count(&rc)))
        .into_inner();
    Ok(declared)
}

/// Cross-checks declared dependency names against the names the caller
/// actually provided; any declared name missing from `provided` is
/// fatal.
pub fn cross_check_modules(declared: &[String], provided: &[String]) -> Result<(), LogicError> {
    for name in declared {
        if !provided.contains(name) {
            return Err(LogicError::UnknownModule(name.clone()));
        }
    }
    Ok(())
}

/// Builds the `GLOBAL` table injected into a dependent's environment:
/// resolved module dependencies live under the name the dependent
/// declared them as, so both scripts and modules read them as
/// `GLOBAL.<name>` rather than as bare (and therefore forbidden) globals.
pub fn build_global_table<'lua>(
    lua: &'lua Lua,
    declared_modules: &[String],
    resolved_modules: &[(&str, &ModuleNode)],
) -> mlua::Result<Table<'lua>> {
    let global = lua.create_table()?;
    for name in declared_modules {
        let (_, module) = resolved_modules
            .iter()
            .find(|(n, _)| n == name)
            .expect("cross_check_modules already verified this name is provided");
        global.raw_set(name.as_str(), module.table(lua)?)?;
    }
    Ok(global)
}
