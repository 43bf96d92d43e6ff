//! `TypeNode` -- the frozen schema produced by the type extractor and used
//! to seed both the input and output property trees of a script/interface,
//! or the single tree of a module-less node kind.

use crate::error::LogicError;
use crate::types::value::ValueType;

/// Maximum array length: fixed length must be `>= 1` and `<= 255`.
pub const MAX_ARRAY_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    /// A primitive or vector leaf.
    Leaf(ValueType),
    /// An ordered, lexicographically-sorted set of named fields.
    Struct(Vec<(String, TypeNode)>),
    /// A fixed-length homogeneous sequence. Element type may be any
    /// non-Array type, including `Struct`.
    Array(usize, Box<TypeNode>),
}

impl TypeNode {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypeNode::Leaf(t) => *t,
            TypeNode::Struct(_) => ValueType::Struct,
            TypeNode::Array(_, _) => ValueType::Array,
        }
    }

    /// Builds a struct type node, sorting fields lexicographically by name
    /// and rejecting duplicates.
    pub fn new_struct(mut fields: Vec<(String, TypeNode)>) -> Result<TypeNode, LogicError> {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in fields.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(LogicError::DuplicateProperty(pair[0].0.clone()));
            }
        }
        Ok(TypeNode::Struct(fields))
    }

    /// Builds an array type node, validating length and disallowing
    /// arrays-of-arrays.
    pub fn new_array(len: usize, element: TypeNode) -> Result<TypeNode, LogicError> {
        if len == 0 || len > MAX_ARRAY_LEN {
            return Err(LogicError::IllegalArgument(format!(
                "array length {len} out of range 1..={MAX_ARRAY_LEN}"
            )));
        }
        if matches!(element, TypeNode::Array(_, _)) {
            return Err(LogicError::IllegalArgument(
                "array of array is not allowed".into(),
            ));
        }
        Ok(TypeNode::Array(len, Box::new(element)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_sort_lexicographically() {
        let t = TypeNode::new_struct(vec![
            ("d".into(), TypeNode::Leaf(ValueType::Float)),
            ("b".into(), TypeNode::Leaf(ValueType::Float)),
            ("c".into(), TypeNode::Leaf(ValueType::Float)),
            ("a".into(), TypeNode::Leaf(ValueType::Float)),
        ])
        .unwrap();
        let TypeNode::Struct(fields) = t else {
            panic!("expected struct")
        };
        let names: Vec<_> = fields.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn duplicate_struct_field_is_rejected() {
        let err = TypeNode::new_struct(vec![
            ("a".into(), TypeNode::Leaf(ValueType::Float)),
            ("a".into(), TypeNode::Leaf(ValueType::Int32)),
        ])
        .unwrap_err();
        assert!(matches!(err, LogicError::DuplicateProperty(_)));
    }

    #[test]
    fn array_length_bounds_are_enforced() {
        assert!(TypeNode::new_array(0, TypeNode::Leaf(ValueType::Float)).is_err());
        assert!(TypeNode::new_array(256, TypeNode::Leaf(ValueType::Float)).is_err());
        assert!(TypeNode::new_array(255, TypeNode::Leaf(ValueType::Float)).is_ok());
    }

    #[test]
    fn array_of_array_is_rejected() {
        let inner = TypeNode::Array(2, Box::new(TypeNode::Leaf(ValueType::Float)));
        assert!(TypeNode::new_array(3, inner).is_err());
    }
}
