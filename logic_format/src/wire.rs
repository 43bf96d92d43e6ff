//! Primitive little-endian encode/decode helpers shared by every object
//! writer/reader in [`crate::objects`].
//!
//! Grounded on `grim_formats::three_do`'s `Cursor` + `byteorder` reading
//! idiom (sequential `read_u32::<LittleEndian>()` calls over a borrowed
//! buffer) -- the write side has no direct teacher counterpart, since
//! `grim_formats` only ever reads game archives, so the `write_*`
//! functions here are this crate's own mirror of that reading style.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use logic_core::{LogicError, NodeId, PropertyIndex, PropertyRef, PropertyTree, TreeSide, TypeNode, Value, ValueType};

fn io_err(e: std::io::Error) -> LogicError {
    LogicError::CorruptedBinary(e.to_string())
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<(), LogicError> {
    w.write_u8(v).map_err(io_err)
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8, LogicError> {
    r.read_u8().map_err(io_err)
}

pub fn write_bool<W: Write>(w: &mut W, v: bool) -> Result<(), LogicError> {
    write_u8(w, v as u8)
}

pub fn read_bool<R: Read>(r: &mut R) -> Result<bool, LogicError> {
    Ok(read_u8(r)? != 0)
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<(), LogicError> {
    w.write_u32::<LittleEndian>(v).map_err(io_err)
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, LogicError> {
    r.read_u32::<LittleEndian>().map_err(io_err)
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<(), LogicError> {
    w.write_u64::<LittleEndian>(v).map_err(io_err)
}

pub fn read_u64<R: Read>(r: &mut R) -> Result<u64, LogicError> {
    r.read_u64::<LittleEndian>().map_err(io_err)
}

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<(), LogicError> {
    w.write_i32::<LittleEndian>(v).map_err(io_err)
}

pub fn read_i32<R: Read>(r: &mut R) -> Result<i32, LogicError> {
    r.read_i32::<LittleEndian>().map_err(io_err)
}

pub fn write_i64<W: Write>(w: &mut W, v: i64) -> Result<(), LogicError> {
    w.write_i64::<LittleEndian>(v).map_err(io_err)
}

pub fn read_i64<R: Read>(r: &mut R) -> Result<i64, LogicError> {
    r.read_i64::<LittleEndian>().map_err(io_err)
}

pub fn write_f32<W: Write>(w: &mut W, v: f32) -> Result<(), LogicError> {
    w.write_f32::<LittleEndian>(v).map_err(io_err)
}

pub fn read_f32<R: Read>(r: &mut R) -> Result<f32, LogicError> {
    r.read_f32::<LittleEndian>().map_err(io_err)
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), LogicError> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes()).map_err(io_err)
}

pub fn read_string<R: Read>(r: &mut R) -> Result<String, LogicError> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(io_err)?;
    String::from_utf8(buf).map_err(|e| LogicError::CorruptedBinary(e.to_string()))
}

pub fn write_node_id<W: Write>(w: &mut W, id: NodeId) -> Result<(), LogicError> {
    write_u64(w, id.0)
}

pub fn read_node_id<R: Read>(r: &mut R) -> Result<NodeId, LogicError> {
    Ok(NodeId(read_u64(r)?))
}

fn value_type_tag(ty: ValueType) -> u8 {
    match ty {
        ValueType::Bool => 0,
        ValueType::Int32 => 1,
        ValueType::Int64 => 2,
        ValueType::Float => 3,
        ValueType::String => 4,
        ValueType::Vec2f => 5,
        ValueType::Vec3f => 6,
        ValueType::Vec4f => 7,
        ValueType::Vec2i => 8,
        ValueType::Vec3i => 9,
        ValueType::Vec4i => 10,
        ValueType::Struct => 11,
        ValueType::Array => 12,
    }
}

fn value_type_from_tag(tag: u8) -> Result<ValueType, LogicError> {
    Ok(match tag {
        0 => ValueType::Bool,
        1 => ValueType::Int32,
        2 => ValueType::Int64,
        3 => ValueType::Float,
        4 => ValueType::String,
        5 => ValueType::Vec2f,
        6 => ValueType::Vec3f,
        7 => ValueType::Vec4f,
        8 => ValueType::Vec2i,
        9 => ValueType::Vec3i,
        10 => ValueType::Vec4i,
        11 => ValueType::Struct,
        12 => ValueType::Array,
        other => return Err(LogicError::CorruptedBinary(format!("unknown value type tag {other}"))),
    })
}

pub fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<(), LogicError> {
    write_u8(w, value_type_tag(value.value_type()))?;
    match value {
        Value::Bool(b) => write_bool(w, *b),
        Value::Int32(v) => write_i32(w, *v),
        Value::Int64(v) => write_i64(w, *v),
        Value::Float(v) => write_f32(w, *v),
        Value::String(s) => write_string(w, s),
        Value::Vec2f(a) => a.iter().try_for_each(|c| write_f32(w, *c)),
        Value::Vec3f(a) => a.iter().try_for_each(|c| write_f32(w, *c)),
        Value::Vec4f(a) => a.iter().try_for_each(|c| write_f32(w, *c)),
        Value::Vec2i(a) => a.iter().try_for_each(|c| write_i32(w, *c)),
        Value::Vec3i(a) => a.iter().try_for_each(|c| write_i32(w, *c)),
        Value::Vec4i(a) => a.iter().try_for_each(|c| write_i32(w, *c)),
    }
}

pub fn read_value<R: Read>(r: &mut R) -> Result<Value, LogicError> {
    let tag = read_u8(r)?;
    Ok(match value_type_from_tag(tag)? {
        ValueType::Bool => Value::Bool(read_bool(r)?),
        ValueType::Int32 => Value::Int32(read_i32(r)?),
        ValueType::Int64 => Value::Int64(read_i64(r)?),
        ValueType::Float => Value::Float(read_f32(r)?),
        ValueType::String => Value::String(read_string(r)?),
        ValueType::Vec2f => Value::Vec2f([read_f32(r)?, read_f32(r)?]),
        ValueType::Vec3f => Value::Vec3f([read_f32(r)?, read_f32(r)?, read_f32(r)?]),
        ValueType::Vec4f => Value::Vec4f([read_f32(r)?, read_f32(r)?, read_f32(r)?, read_f32(r)?]),
        ValueType::Vec2i => Value::Vec2i([read_i32(r)?, read_i32(r)?]),
        ValueType::Vec3i => Value::Vec3i([read_i32(r)?, read_i32(r)?, read_i32(r)?]),
        ValueType::Vec4i => Value::Vec4i([read_i32(r)?, read_i32(r)?, read_i32(r)?, read_i32(r)?]),
        other => return Err(LogicError::CorruptedBinary(format!("{other} has no leaf value"))),
    })
}

fn write_option_value<W: Write>(w: &mut W, value: &Option<Value>) -> Result<(), LogicError> {
    match value {
        Some(v) => {
            write_bool(w, true)?;
            write_value(w, v)
        }
        None => write_bool(w, false),
    }
}

fn read_option_value<R: Read>(r: &mut R) -> Result<Option<Value>, LogicError> {
    if read_bool(r)? {
        Ok(Some(read_value(r)?))
    } else {
        Ok(None)
    }
}

/// Writes `schema`'s shape: a leaf's value type, a struct's sorted field
/// names, or an array's length -- in the same depth-first order
/// [`type_node_of_tree`] walks an already-built `PropertyTree`.
pub fn write_type_node<W: Write>(w: &mut W, schema: &TypeNode) -> Result<(), LogicError> {
    match schema {
        TypeNode::Leaf(ty) => {
            write_u8(w, 0)?;
            write_u8(w, value_type_tag(*ty))
        }
        TypeNode::Struct(fields) => {
            write_u8(w, 1)?;
            write_u32(w, fields.len() as u32)?;
            for (name, field) in fields {
                write_string(w, name)?;
                write_type_node(w, field)?;
            }
            Ok(())
        }
        TypeNode::Array(len, elem) => {
            write_u8(w, 2)?;
            write_u32(w, *len as u32)?;
            write_type_node(w, elem)
        }
    }
}

pub fn read_type_node<R: Read>(r: &mut R) -> Result<TypeNode, LogicError> {
    Ok(match read_u8(r)? {
        0 => TypeNode::Leaf(value_type_from_tag(read_u8(r)?)?),
        1 => {
            let count = read_u32(r)? as usize;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                let name = read_string(r)?;
                let field = read_type_node(r)?;
                fields.push((name, field));
            }
            // Already sorted and deduplicated when first frozen by
            // `TypeNode::new_struct`; re-validating here would just repeat
            // that work on data the writer already trusted.
            TypeNode::Struct(fields)
        }
        2 => {
            let len = read_u32(r)? as usize;
            let elem = read_type_node(r)?;
            TypeNode::Array(len, Box::new(elem))
        }
        other => return Err(LogicError::CorruptedBinary(format!("unknown schema tag {other}"))),
    })
}

/// Recovers the `TypeNode` a `PropertyTree` was built from. Neither
/// `InterfaceNode` nor `BindingNode` keeps the schema it was constructed
/// with around, but `Property::value_type` already distinguishes a
/// struct node (`ValueType::Struct`) and an array node (`ValueType::Array`)
/// from their leaf descendants, so the shape is fully recoverable by
/// walking the tree.
pub fn type_node_of_tree(tree: &PropertyTree, idx: PropertyIndex) -> TypeNode {
    let prop = tree.get_prop(idx);
    match prop.value_type {
        ValueType::Struct => {
            let fields = (0..tree.child_count(idx))
                .map(|i| {
                    let child = tree.child_by_index(idx, i).expect("index within child_count");
                    (tree.get_prop(child).name.clone(), type_node_of_tree(tree, child))
                })
                .collect();
            TypeNode::Struct(fields)
        }
        ValueType::Array => {
            let len = tree.child_count(idx);
            let first = tree.child_by_index(idx, 0).expect("array type node has at least one element");
            TypeNode::Array(len, Box::new(type_node_of_tree(tree, first)))
        }
        leaf => TypeNode::Leaf(leaf),
    }
}

/// Writes every leaf property's current value, in arena order -- the same
/// order [`restore_tree_values`] expects to read them back in, since both
/// sides walk a tree built from the identical schema.
pub fn write_tree_values<W: Write>(w: &mut W, tree: &PropertyTree) -> Result<(), LogicError> {
    for (_, prop) in tree.iter() {
        if prop.value_type.is_leaf() {
            write_option_value(w, &prop.value)?;
        }
    }
    Ok(())
}

pub fn restore_tree_values<R: Read>(r: &mut R, tree: &mut PropertyTree) -> Result<(), LogicError> {
    let leaves: Vec<PropertyIndex> = tree.iter().filter(|(_, p)| p.value_type.is_leaf()).map(|(i, _)| i).collect();
    for idx in leaves {
        if let Some(value) = read_option_value(r)? {
            tree.set_internal(idx, value)
                .map_err(|e| LogicError::CorruptedBinary(format!("restoring property value: {e}")))?;
        }
    }
    Ok(())
}

fn side_tag(side: TreeSide) -> u8 {
    match side {
        TreeSide::Input => 0,
        TreeSide::Output => 1,
        TreeSide::Interface => 2,
    }
}

fn side_from_tag(tag: u8) -> Result<TreeSide, LogicError> {
    Ok(match tag {
        0 => TreeSide::Input,
        1 => TreeSide::Output,
        2 => TreeSide::Interface,
        other => return Err(LogicError::CorruptedBinary(format!("unknown tree side tag {other}"))),
    })
}

pub fn write_property_ref<W: Write>(w: &mut W, pref: &PropertyRef) -> Result<(), LogicError> {
    write_node_id(w, pref.node)?;
    write_u8(w, side_tag(pref.side))?;
    write_u32(w, pref.index.0)
}

pub fn read_property_ref<R: Read>(r: &mut R) -> Result<PropertyRef, LogicError> {
    let node = read_node_id(r)?;
    let side = side_from_tag(read_u8(r)?)?;
    let index = PropertyIndex(read_u32(r)?);
    Ok(PropertyRef::new(node, side, index))
}
