//! The logic graph engine core: typed properties, the Lua sandbox that
//! backs scripts/modules/interfaces, the link graph and its dirty-driven
//! scheduler, and the engine facade that owns every object's lifetime.
//!
//! Module layout mirrors `grim_formats`: one file per concern under
//! `src/`, re-exported flat from here so callers write `logic_core::NodeId`
//! rather than reaching into submodules.

pub mod error;
pub mod facade;
pub mod graph;
pub mod ids;
pub mod lua;
pub mod nodes;
pub mod types;

pub use error::{ErrorEntry, LogicError, LogicErrorLog, SourceLocation};
pub use facade::{AnimationChannelConfig, ApiObjects, DependencyConfig, ObjectHandle};
pub use graph::LinkGraph;
pub use ids::{IdAllocator, NodeId, UserId};
pub use nodes::{LogicNode, NodeHeader};
pub use types::{FromValue, IntoValue, Property, PropertyIndex, PropertyRef, PropertyTree, SemanticRole, TreeSide, TypeNode, Value, ValueType, MAX_ARRAY_LEN};
