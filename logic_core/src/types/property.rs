//! Properties and property trees.
//!
//! Rather than raw back-pointers between properties, each logic node owns
//! a flat arena of `Property` values and all cross-references are
//! `(NodeId, TreeSide, PropertyIndex)` triples (`PropertyRef`). This
//! mirrors how `grim_formats::LabArchive` keeps a flat `Vec<LabEntry>` and
//! hands out index-based references instead of a pointer graph.

use crate::error::LogicError;
use crate::ids::NodeId;
use crate::types::schema::TypeNode;
use crate::types::value::{FromValue, IntoValue, Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyIndex(pub u32);

/// Which tree a property lives in. `Interface` nodes use a single tree
/// that plays both roles at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeSide {
    Input,
    Output,
    Interface,
}

impl TreeSide {
    /// Whether a property on this side may act as a link *source*.
    pub fn is_output_like(self) -> bool {
        matches!(self, TreeSide::Output | TreeSide::Interface)
    }

    /// Whether a property on this side may act as a link *target*.
    pub fn is_input_like(self) -> bool {
        matches!(self, TreeSide::Input | TreeSide::Interface)
    }
}

/// A cross-node, cross-tree reference to a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    pub node: NodeId,
    pub side: TreeSide,
    pub index: PropertyIndex,
}

impl PropertyRef {
    pub fn new(node: NodeId, side: TreeSide, index: PropertyIndex) -> Self {
        Self { node, side, index }
    }
}

/// Semantic role of a property. Gates external (API) writability; Lua
/// writability is instead gated by which side (`TreeSide`) the property's
/// wrapped view was constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticRole {
    ScriptInput,
    ScriptOutput,
    Interface,
    BindingInput,
    AnimationInput,
    AnimationOutput,
}

impl SemanticRole {
    /// Whether the value is writable from the API.
    pub fn writable_from_api(self) -> bool {
        !matches!(self, SemanticRole::ScriptOutput | SemanticRole::AnimationOutput)
    }

    /// Binding inputs always latch "new value pending" regardless of
    /// whether the stored value actually changed.
    pub fn always_latches(self) -> bool {
        matches!(self, SemanticRole::BindingInput)
    }
}

/// A single node in a property tree.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub value_type: ValueType,
    pub value: Option<Value>,
    pub parent: Option<PropertyIndex>,
    pub children: Vec<PropertyIndex>,
    pub role: SemanticRole,
    /// "new binding value pending" flag.
    pub binding_pending: bool,
}

/// An arena-backed property tree, owned exclusively by one logic node:
/// a property belongs to exactly one logic node, and its lifetime equals
/// the node's.
#[derive(Debug, Clone)]
pub struct PropertyTree {
    arena: Vec<Property>,
}

impl PropertyTree {
    pub const ROOT: PropertyIndex = PropertyIndex(0);

    /// Builds a tree from a frozen schema, seeding every leaf with its
    /// type's default value.
    pub fn from_schema(schema: &TypeNode, role: SemanticRole) -> Self {
        let mut arena = Vec::new();
        Self::build(schema, "", role, None, &mut arena);
        PropertyTree { arena }
    }

    fn build(
        schema: &TypeNode,
        name: &str,
        role: SemanticRole,
        parent: Option<PropertyIndex>,
        arena: &mut Vec<Property>,
    ) -> PropertyIndex {
        let idx = PropertyIndex(arena.len() as u32);
        let value_type = schema.value_type();
        arena.push(Property {
            name: name.to_string(),
            value_type,
            value: Value::default_for(value_type),
            parent,
            children: Vec::new(),
            role,
            binding_pending: false,
        });
        match schema {
            TypeNode::Leaf(_) => {}
            TypeNode::Struct(fields) => {
                for (field_name, field_type) in fields {
                    let child = Self::build(field_type, field_name, role, Some(idx), arena);
                    arena[idx.0 as usize].children.push(child);
                }
            }
            TypeNode::Array(len, elem) => {
                for _ in 0..*len {
                    let child = Self::build(elem, "", role, Some(idx), arena);
                    arena[idx.0 as usize].children.push(child);
                }
            }
        }
        idx
    }

    pub fn root(&self) -> PropertyIndex {
        Self::ROOT
    }

    pub fn get_prop(&self, idx: PropertyIndex) -> &Property {
        &self.arena[idx.0 as usize]
    }

    pub fn get_prop_mut(&mut self, idx: PropertyIndex) -> &mut Property {
        &mut self.arena[idx.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyIndex, &Property)> {
        self.arena
            .iter()
            .enumerate()
            .map(|(i, p)| (PropertyIndex(i as u32), p))
    }

    pub fn child_count(&self, idx: PropertyIndex) -> usize {
        self.arena[idx.0 as usize].children.len()
    }

    pub fn child_by_index(&self, idx: PropertyIndex, i: usize) -> Option<PropertyIndex> {
        self.arena[idx.0 as usize].children.get(i).copied()
    }

    /// Linear scan by design -- structs rarely exceed tens of fields.
    pub fn child_by_name(&self, idx: PropertyIndex, name: &str) -> Option<PropertyIndex> {
        self.arena[idx.0 as usize]
            .children
            .iter()
            .copied()
            .find(|&c| self.arena[c.0 as usize].name == name)
    }

    pub fn get<T: FromValue>(&self, idx: PropertyIndex) -> Option<T> {
        self.arena[idx.0 as usize].value.as_ref().and_then(T::from_value)
    }

    /// Type-checked, role-checked set: dirties the owner only on change
    /// (or always, for binding inputs). Returns whether the caller should
    /// dirty the owning node.
    pub fn set<T: IntoValue>(&mut self, idx: PropertyIndex, v: T) -> Result<bool, LogicError> {
        let value = v.into_value();
        let role = self.arena[idx.0 as usize].role;
        if !role.writable_from_api() {
            return Err(LogicError::ReadOnlyProperty(self.arena[idx.0 as usize].name.clone()));
        }
        self.write_checked(idx, value)
    }

    /// Used by the link propagator (and the Lua output bridge). Bypasses
    /// role checks; binding inputs still latch unconditionally.
    pub fn set_internal(&mut self, idx: PropertyIndex, value: Value) -> Result<bool, LogicError> {
        self.write_checked(idx, value)
    }

    fn write_checked(&mut self, idx: PropertyIndex, value: Value) -> Result<bool, LogicError> {
        let prop = &self.arena[idx.0 as usize];
        if prop.value_type != value.value_type() {
            return Err(LogicError::TypeMismatch {
                expected: prop.value_type.to_string(),
                found: value.value_type().to_string(),
            });
        }
        let changed = prop.value.as_ref() != Some(&value);
        let latches = prop.role.always_latches();
        let prop = &mut self.arena[idx.0 as usize];
        prop.value = Some(value);
        if latches {
            prop.binding_pending = true;
        }
        Ok(changed || latches)
    }

    pub fn take_binding_pending(&mut self, idx: PropertyIndex) -> bool {
        let prop = &mut self.arena[idx.0 as usize];
        let pending = prop.binding_pending;
        prop.binding_pending = false;
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_leaf() -> TypeNode {
        TypeNode::Leaf(ValueType::Float)
    }

    #[test]
    fn set_then_get_round_trips_for_matching_type() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::ScriptInput);
        let root = tree.root();
        tree.set::<f32>(root, 3.5).unwrap();
        assert_eq!(tree.get::<f32>(root), Some(3.5));
    }

    #[test]
    fn set_with_wrong_type_fails_and_leaves_value_unchanged() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::ScriptInput);
        let root = tree.root();
        tree.set::<f32>(root, 3.5).unwrap();
        let err = tree.set::<i32>(root, 7).unwrap_err();
        assert!(matches!(err, LogicError::TypeMismatch { .. }));
        assert_eq!(tree.get::<f32>(root), Some(3.5));
    }

    #[test]
    fn script_output_is_read_only_from_api() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::ScriptOutput);
        let root = tree.root();
        let err = tree.set::<f32>(root, 1.0).unwrap_err();
        assert!(matches!(err, LogicError::ReadOnlyProperty(_)));
    }

    #[test]
    fn set_internal_bypasses_role_check() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::ScriptOutput);
        let root = tree.root();
        let dirtied = tree.set_internal(root, Value::Float(2.0)).unwrap();
        assert!(dirtied);
        assert_eq!(tree.get::<f32>(root), Some(2.0));
    }

    #[test]
    fn writing_same_value_does_not_dirty_non_binding_property() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::ScriptInput);
        let root = tree.root();
        assert!(tree.set::<f32>(root, 1.0).unwrap());
        assert!(!tree.set::<f32>(root, 1.0).unwrap());
    }

    #[test]
    fn binding_input_always_latches_even_on_same_value() {
        let schema = float_leaf();
        let mut tree = PropertyTree::from_schema(&schema, SemanticRole::BindingInput);
        let root = tree.root();
        assert!(tree.set::<f32>(root, 1.0).unwrap());
        assert!(tree.set::<f32>(root, 1.0).unwrap());
        assert!(tree.take_binding_pending(root));
    }

    #[test]
    fn struct_children_share_identical_schema_in_arrays() {
        let elem = TypeNode::new_struct(vec![
            ("a".into(), float_leaf()),
            ("b".into(), TypeNode::Leaf(ValueType::Int32)),
        ])
        .unwrap();
        let arr = TypeNode::new_array(3, elem).unwrap();
        let tree = PropertyTree::from_schema(&arr, SemanticRole::ScriptInput);
        let root = tree.root();
        assert_eq!(tree.child_count(root), 3);
        let mut shapes = Vec::new();
        for i in 0..3 {
            let child = tree.child_by_index(root, i).unwrap();
            let names: Vec<_> = (0..tree.child_count(child))
                .map(|j| tree.get_prop(tree.child_by_index(child, j).unwrap()).name.clone())
                .collect();
            shapes.push(names);
        }
        assert_eq!(shapes[0], shapes[1]);
        assert_eq!(shapes[1], shapes[2]);
    }
}
