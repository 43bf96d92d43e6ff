//! Lua sandbox, type extractor, and property bridge.
//!
//! Grounded on `grim_engine::lua_host` (an `mlua`-embedding Lua host for a
//! scripted runtime) for the shape of environment installation and
//! `Rc<RefCell<..>>`-shared context, and on
//! `original_source/lib/internals/EnvironmentProtection.cpp` for the exact
//! per-mode read/write rules.

pub mod bridge;
pub mod conversions;
pub mod extractor;
pub mod iter_helpers;
pub mod modules;
pub mod sandbox;

pub use bridge::WrappedProperty;
pub use extractor::{extract_inout_interface, extract_interface};
pub use modules::wrap_module_readonly;
pub use sandbox::{ProtectionMode, SandboxEnv, ScriptHost, StdModules};
