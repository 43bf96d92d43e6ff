//! The value domain: primitives, fixed-width vectors, and the
//! discriminator used by `Struct`/`Array` schema nodes.

use std::fmt;

/// Every semantic type a `Property` can declare.
///
/// `Struct` and `Array` never carry a value slot directly -- only their
/// leaf descendants do -- but they are still `ValueType` variants because
/// a `Property`'s declared type is what schema extraction and link
/// type-checking compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Float,
    String,
    Vec2f,
    Vec3f,
    Vec4f,
    Vec2i,
    Vec3i,
    Vec4i,
    Struct,
    Array,
}

impl ValueType {
    /// Primitives and vectors have a value slot; `Struct`/`Array` do not.
    pub fn is_leaf(self) -> bool {
        !matches!(self, ValueType::Struct | ValueType::Array)
    }

    pub fn vector_len(self) -> Option<usize> {
        match self {
            ValueType::Vec2f | ValueType::Vec2i => Some(2),
            ValueType::Vec3f | ValueType::Vec3i => Some(3),
            ValueType::Vec4f | ValueType::Vec4i => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "Bool",
            ValueType::Int32 => "Int32",
            ValueType::Int64 => "Int64",
            ValueType::Float => "Float",
            ValueType::String => "String",
            ValueType::Vec2f => "Vec2f",
            ValueType::Vec3f => "Vec3f",
            ValueType::Vec4f => "Vec4f",
            ValueType::Vec2i => "Vec2i",
            ValueType::Vec3i => "Vec3i",
            ValueType::Vec4i => "Vec4i",
            ValueType::Struct => "Struct",
            ValueType::Array => "Array",
        };
        f.write_str(name)
    }
}

/// A concrete leaf value. Only constructed for primitive/vector properties;
/// `Struct`/`Array` properties never hold one -- only their leaf
/// descendants carry a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    String(String),
    Vec2f([f32; 2]),
    Vec3f([f32; 3]),
    Vec4f([f32; 4]),
    Vec2i([i32; 2]),
    Vec3i([i32; 3]),
    Vec4i([i32; 4]),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Vec2f(_) => ValueType::Vec2f,
            Value::Vec3f(_) => ValueType::Vec3f,
            Value::Vec4f(_) => ValueType::Vec4f,
            Value::Vec2i(_) => ValueType::Vec2i,
            Value::Vec3i(_) => ValueType::Vec3i,
            Value::Vec4i(_) => ValueType::Vec4i,
        }
    }

    /// The default value for a freshly-created leaf of `ty`, used to seed
    /// property trees at schema-freeze time.
    pub fn default_for(ty: ValueType) -> Option<Value> {
        Some(match ty {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int32 => Value::Int32(0),
            ValueType::Int64 => Value::Int64(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Vec2f => Value::Vec2f([0.0; 2]),
            ValueType::Vec3f => Value::Vec3f([0.0; 3]),
            ValueType::Vec4f => Value::Vec4f([0.0; 4]),
            ValueType::Vec2i => Value::Vec2i([0; 2]),
            ValueType::Vec3i => Value::Vec3i([0; 3]),
            ValueType::Vec4i => Value::Vec4i([0; 4]),
            ValueType::Struct | ValueType::Array => return None,
        })
    }
}

/// Typed extraction/injection used by `Property::get`/`Property::set`.
///
/// Mirrors the teacher's pattern of small conversion trait impls rather
/// than a single generic match (see `grim_formats::blocky16`'s per-width
/// read helpers) -- here specialized per `ValueType` instead of per byte
/// width.
pub trait FromValue: Sized {
    const TYPE: ValueType;
    fn from_value(v: &Value) -> Option<Self>;
}

pub trait IntoValue {
    const TYPE: ValueType;
    fn into_value(self) -> Value;
}

macro_rules! impl_value_conversion {
    ($rust_ty:ty, $variant:ident) => {
        impl FromValue for $rust_ty {
            const TYPE: ValueType = ValueType::$variant;
            fn from_value(v: &Value) -> Option<Self> {
                match v {
                    Value::$variant(x) => Some(x.clone()),
                    _ => None,
                }
            }
        }

        impl IntoValue for $rust_ty {
            const TYPE: ValueType = ValueType::$variant;
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_value_conversion!(bool, Bool);
impl_value_conversion!(i32, Int32);
impl_value_conversion!(i64, Int64);
impl_value_conversion!(f32, Float);
impl_value_conversion!(String, String);
impl_value_conversion!([f32; 2], Vec2f);
impl_value_conversion!([f32; 3], Vec3f);
impl_value_conversion!([f32; 4], Vec4f);
impl_value_conversion!([i32; 2], Vec2i);
impl_value_conversion!([i32; 3], Vec3i);
impl_value_conversion!([i32; 4], Vec4i);
