//! Binding: an input-only leaf that pushes "new value pending" inputs to
//! an external scene receiver.
//!
//! The concrete binding kinds (transform, uniform/appearance, camera,
//! render-pass) and the receivers they target are scene-specific glue
//! outside the core -- here we only own the input property tree, the
//! schema each kind mirrors, and the `SceneReceiver` contract, the same
//! way `grim_engine::lua_host::context::audio` defines an `AudioCallback`
//! trait the host implements without the Lua layer knowing its concrete
//! type.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::nodes::NodeHeader;
use crate::types::property::{PropertyIndex, PropertyTree, SemanticRole};
use crate::types::schema::TypeNode;
use crate::types::value::Value;

/// The external resource a binding's input schema mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    NodeTransform,
    Appearance,
    Camera,
    RenderPass,
}

impl BindingKind {
    /// The fixed input schema for this kind. Node transform is the six
    /// floats of translation + rotation; appearance is left open-ended
    /// (caller-supplied uniform slots) and is handled by
    /// `BindingNode::new_appearance`; camera mirrors viewport + frustum.
    pub fn fixed_schema(self) -> Option<TypeNode> {
        match self {
            BindingKind::NodeTransform => Some(
                TypeNode::new_struct(vec![
                    ("tx".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("ty".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("tz".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("rx".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("ry".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("rz".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                ])
                .expect("fixed field names are unique"),
            ),
            BindingKind::Camera => Some(
                TypeNode::new_struct(vec![
                    ("viewport_x".into(), TypeNode::Leaf(crate::types::value::ValueType::Int32)),
                    ("viewport_y".into(), TypeNode::Leaf(crate::types::value::ValueType::Int32)),
                    ("viewport_width".into(), TypeNode::Leaf(crate::types::value::ValueType::Int32)),
                    ("viewport_height".into(), TypeNode::Leaf(crate::types::value::ValueType::Int32)),
                    ("near_plane".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("far_plane".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("field_of_view".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                    ("aspect_ratio".into(), TypeNode::Leaf(crate::types::value::ValueType::Float)),
                ])
                .expect("fixed field names are unique"),
            ),
            BindingKind::Appearance | BindingKind::RenderPass => None,
        }
    }
}

/// One pushed input value, named by its property path.
pub struct PendingValue {
    pub path: String,
    pub value: Value,
}

/// Something a binding can push its pending inputs into. Implemented by
/// scene adapters outside the core (see `logic_bindings`); the core
/// depends only on this contract.
pub trait SceneReceiver {
    fn external_scene_id(&self, external_ref: &str) -> Option<u64>;
    fn push_values(&mut self, external_ref: &str, kind: BindingKind, values: &[PendingValue]) -> Result<(), LogicError>;
}

/// A no-op receiver: drops every push. Used in tests and by callers that
/// only want `update()` to drain the dirty flags.
#[derive(Default)]
pub struct NullSceneReceiver;

impl SceneReceiver for NullSceneReceiver {
    fn external_scene_id(&self, _external_ref: &str) -> Option<u64> {
        Some(0)
    }

    fn push_values(&mut self, _external_ref: &str, _kind: BindingKind, _values: &[PendingValue]) -> Result<(), LogicError> {
        Ok(())
    }
}

pub struct BindingNode {
    pub header: NodeHeader,
    pub kind: BindingKind,
    pub external_ref: String,
    pub input_tree: Rc<RefCell<PropertyTree>>,
}

impl BindingNode {
    pub fn new(header: NodeHeader, kind: BindingKind, external_ref: String, schema: &TypeNode) -> Self {
        let tree = PropertyTree::from_schema(schema, SemanticRole::BindingInput);
        Self { header, kind, external_ref, input_tree: Rc::new(RefCell::new(tree)) }
    }

    /// Bindings are terminal: they never source links, only the façade
    /// may write their inputs (or a link into them). On update, for each
    /// input whose "new value pending" flag is set, push it and clear it.
    pub fn update(&mut self, receiver: &mut dyn SceneReceiver) -> Result<(), LogicError> {
        let mut pending = Vec::new();
        {
            let mut tree = self.input_tree.borrow_mut();
            let root = tree.root();
            collect_pending(&mut tree, root, String::new(), &mut pending);
        }
        if pending.is_empty() {
            return Ok(());
        }
        receiver.push_values(&self.external_ref, self.kind, &pending)
    }
}

fn collect_pending(tree: &mut PropertyTree, idx: PropertyIndex, path: String, out: &mut Vec<PendingValue>) {
    let child_count = tree.child_count(idx);
    if child_count == 0 {
        if tree.take_binding_pending(idx) {
            if let Some(value) = tree.get_prop(idx).value.clone() {
                out.push(PendingValue { path, value });
            }
        }
        return;
    }
    for i in 0..child_count {
        let child = tree.child_by_index(idx, i).expect("index within child_count");
        let child_name = tree.get_prop(child).name.clone();
        let child_path = if path.is_empty() { child_name } else { format!("{path}.{child_name}") };
        collect_pending(tree, child, child_path, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    #[test]
    fn update_pushes_only_pending_values_and_clears_flags() {
        let schema = BindingKind::NodeTransform.fixed_schema().unwrap();
        let mut node = BindingNode::new(
            NodeHeader::new(NodeId(1), "xform".into()),
            BindingKind::NodeTransform,
            "scene_obj_1".into(),
            &schema,
        );
        {
            let mut tree = node.input_tree.borrow_mut();
            let root = tree.root();
            let tx = tree.child_by_name(root, "tx").unwrap();
            tree.set_internal(tx, Value::Float(2.0)).unwrap();
        }
        let mut receiver = RecordingReceiver::default();
        node.update(&mut receiver).unwrap();
        assert_eq!(receiver.pushed.len(), 1);
        assert_eq!(receiver.pushed[0].1.len(), 1);
        assert_eq!(receiver.pushed[0].1[0].path, "tx");

        node.update(&mut receiver).unwrap();
        assert_eq!(receiver.pushed.len(), 1, "second update with no new writes pushes nothing");
    }

    #[derive(Default)]
    struct RecordingReceiver {
        pushed: Vec<(String, Vec<PendingValue>)>,
    }

    impl SceneReceiver for RecordingReceiver {
        fn external_scene_id(&self, _external_ref: &str) -> Option<u64> {
            Some(1)
        }

        fn push_values(&mut self, external_ref: &str, _kind: BindingKind, values: &[PendingValue]) -> Result<(), LogicError> {
            let cloned = values.iter().map(|v| PendingValue { path: v.path.clone(), value: v.value.clone() }).collect();
            self.pushed.push((external_ref.to_string(), cloned));
            Ok(())
        }
    }
}
