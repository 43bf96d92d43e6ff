//! Interface: a typed hub whose inputs and outputs are the same tree.
//!
//! The source models this as one property tree referenced from both the
//! input and output sides; the node-owned-arena redesign already gives
//! every property a single home, so there is nothing left to copy on
//! `update()` -- a link feeding the interface and a link sourced from it
//! read and write the very same `Property`. `update()` is therefore a
//! no-op kept only so the scheduler can treat every node kind uniformly;
//! see `DESIGN.md` for why this reconciles with the source's "copies
//! each field to the output" description.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::nodes::NodeHeader;
use crate::types::property::{PropertyTree, SemanticRole};
use crate::types::schema::TypeNode;

pub struct InterfaceNode {
    pub header: NodeHeader,
    pub tree: Rc<RefCell<PropertyTree>>,
}

impl InterfaceNode {
    pub fn new(header: NodeHeader, schema: &TypeNode) -> Result<Self, LogicError> {
        if header.name.is_empty() {
            return Err(LogicError::IllegalArgument("an interface node's name must be non-empty".to_string()));
        }
        let tree = PropertyTree::from_schema(schema, SemanticRole::Interface);
        Ok(Self { header, tree: Rc::new(RefCell::new(tree)) })
    }

    pub fn update(&mut self) -> Result<(), LogicError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::types::value::ValueType;

    #[test]
    fn empty_name_is_rejected() {
        let schema = TypeNode::Leaf(ValueType::Float);
        let err = InterfaceNode::new(NodeHeader::new(NodeId(1), String::new()), &schema).unwrap_err();
        assert!(matches!(err, LogicError::IllegalArgument(_)));
    }

    #[test]
    fn a_write_is_immediately_visible_as_its_own_output() {
        let schema = TypeNode::Leaf(ValueType::Float);
        let node = InterfaceNode::new(NodeHeader::new(NodeId(1), "hub".into()), &schema).unwrap();
        {
            let mut tree = node.tree.borrow_mut();
            let root = tree.root();
            tree.set_internal(root, crate::types::value::Value::Float(3.0)).unwrap();
        }
        let tree = node.tree.borrow();
        let root = tree.root();
        assert_eq!(tree.get::<f32>(root), Some(3.0));
    }
}
