//! Type system & property tree.

pub mod property;
pub mod schema;
pub mod value;

pub use property::{Property, PropertyIndex, PropertyRef, PropertyTree, SemanticRole, TreeSide};
pub use schema::{TypeNode, MAX_ARRAY_LEN};
pub use value::{FromValue, IntoValue, Value, ValueType};
