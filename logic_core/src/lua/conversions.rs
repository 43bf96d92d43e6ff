//! Numeric extraction rules.
//!
//! Grounded on `original_source/lib/internals/LuaTypeConversions.cpp`:
//! Lua numbers are IEEE-754 doubles; conversions to narrower types use a
//! single-epsilon rounding tolerance and reject anything further off or
//! out of range, rather than silently truncating.

use mlua::Value;

use crate::error::LogicError;

fn as_f64(v: &Value) -> Result<f64, LogicError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Integer(i) => Ok(*i as f64),
        other => Err(LogicError::TypeMismatch {
            expected: "number".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

pub fn extract_f32(v: &Value) -> Result<f32, LogicError> {
    let d = as_f64(v)?;
    if d > f32::MAX as f64 || d < f32::MIN as f64 {
        return Err(LogicError::IllegalArgument(format!(
            "value {d} is out of range for Float"
        )));
    }
    Ok(d as f32)
}

fn round_within_epsilon(d: f64, label: &str) -> Result<f64, LogicError> {
    let rounded = d.round();
    if (d - rounded).abs() > f64::EPSILON {
        return Err(LogicError::IllegalArgument(format!(
            "value {d} is not integral (within tolerance) for {label}"
        )));
    }
    Ok(rounded)
}

pub fn extract_i32(v: &Value) -> Result<i32, LogicError> {
    let d = as_f64(v)?;
    let rounded = round_within_epsilon(d, "Int32")?;
    if rounded > i32::MAX as f64 || rounded < i32::MIN as f64 {
        return Err(LogicError::IllegalArgument(format!(
            "value {d} is out of range for Int32"
        )));
    }
    Ok(rounded as i32)
}

pub fn extract_i64(v: &Value) -> Result<i64, LogicError> {
    let d = as_f64(v)?;
    let rounded = round_within_epsilon(d, "Int64")?;
    if rounded > i64::MAX as f64 || rounded < i64::MIN as f64 {
        return Err(LogicError::IllegalArgument(format!(
            "value {d} is out of range for Int64"
        )));
    }
    Ok(rounded as i64)
}

/// Extraction rule for `size_t`/array indices: non-negative within one
/// epsilon, additionally to the integral-rounding rule.
pub fn extract_index(v: &Value) -> Result<usize, LogicError> {
    let d = as_f64(v)?;
    if d < -f64::EPSILON {
        return Err(LogicError::IllegalArgument(format!(
            "index {d} must be non-negative"
        )));
    }
    let rounded = round_within_epsilon(d, "index")?;
    if rounded > usize::MAX as f64 {
        return Err(LogicError::IllegalArgument(format!(
            "index {d} is out of range"
        )));
    }
    Ok(rounded as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_doubles_convert_to_int32() {
        assert_eq!(extract_i32(&Value::Number(3.0)).unwrap(), 3);
        assert_eq!(extract_i32(&Value::Integer(-7)).unwrap(), -7);
    }

    #[test]
    fn fractional_doubles_are_rejected_for_int32() {
        assert!(extract_i32(&Value::Number(3.5)).is_err());
    }

    #[test]
    fn out_of_range_int32_is_rejected() {
        assert!(extract_i32(&Value::Number(i64::from(i32::MAX) as f64 + 10.0)).is_err());
    }

    #[test]
    fn negative_index_is_rejected() {
        assert!(extract_index(&Value::Number(-1.0)).is_err());
    }

    #[test]
    fn zero_index_is_accepted() {
        assert_eq!(extract_index(&Value::Number(0.0)).unwrap(), 0);
    }

    #[test]
    fn float_out_of_range_is_rejected() {
        assert!(extract_f32(&Value::Number(f64::MAX)).is_err());
    }
}
