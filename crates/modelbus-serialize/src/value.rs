use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SerializeError};

/// One field of a format message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

/// The kind of a [`Value`], and of the field that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Str,
    Int,
    Float,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Str => "string",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
        })
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

/// Extract a Rust value from the `field`-th message value. No coercion
/// between kinds.
pub trait FromValue: Sized {
    fn from_value(field: usize, value: Value) -> Result<Self>;
}

fn mismatch(field: usize, expected: ValueKind, value: &Value) -> SerializeError {
    SerializeError::TypeMismatch {
        field,
        expected,
        actual: value.kind(),
    }
}

impl FromValue for Value {
    fn from_value(_field: usize, value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(field: usize, value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch(field, ValueKind::Str, &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(field: usize, value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::Int, &other)),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(field: usize, value: Value) -> Result<Self> {
                    let wide = i64::from_value(field, value)?;
                    <$ty>::try_from(wide).map_err(|_| SerializeError::OutOfRange {
                        field,
                        value: wide,
                        target: stringify!($ty),
                    })
                }
            }
        )+
    };
}

narrow_int!(i32, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(field: usize, value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::Float, &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(field: usize, value: Value) -> Result<Self> {
        f64::from_value(field, value).map(|v| v as f32)
    }
}

/// A fixed-arity group of values that can be sent as one format message.
pub trait IntoValues {
    fn into_values(self) -> Vec<Value>;
}

/// A fixed-arity group of values that can be received from one format
/// message.
pub trait FromValues: Sized {
    fn from_values(values: Vec<Value>) -> Result<Self>;
}

impl IntoValues for Vec<Value> {
    fn into_values(self) -> Vec<Value> {
        self
    }
}

impl FromValues for Vec<Value> {
    fn from_values(values: Vec<Value>) -> Result<Self> {
        Ok(values)
    }
}

macro_rules! tuple_values {
    ($len:expr; $($name:ident $idx:tt),+) => {
        impl<$($name: Into<Value>),+> IntoValues for ($($name,)+) {
            fn into_values(self) -> Vec<Value> {
                vec![$(self.$idx.into()),+]
            }
        }

        impl<$($name: FromValue),+> FromValues for ($($name,)+) {
            fn from_values(values: Vec<Value>) -> Result<Self> {
                let actual = values.len();
                if actual != $len {
                    return Err(SerializeError::ArityMismatch { expected: $len, actual });
                }
                let mut iter = values.into_iter();
                Ok(($(
                    <$name as FromValue>::from_value(
                        $idx,
                        iter.next().ok_or(SerializeError::ArityMismatch { expected: $len, actual })?,
                    )?,
                )+))
            }
        }
    };
}

tuple_values!(1; A 0);
tuple_values!(2; A 0, B 1);
tuple_values!(3; A 0, B 1, C 2);
tuple_values!(4; A 0, B 1, C 2, D 3);
tuple_values!(5; A 0, B 1, C 2, D 3, E 4);
tuple_values!(6; A 0, B 1, C 2, D 3, E 4, F 5);
tuple_values!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
tuple_values!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_into_values() {
        let values = ("abcdef", 42i64, 3.14f64).into_values();
        assert_eq!(
            values,
            vec![Value::from("abcdef"), Value::Int(42), Value::Float(3.14)]
        );
    }

    #[test]
    fn tuple_from_values() {
        let values = vec![Value::from("x"), Value::Int(7)];
        let (s, n): (String, i32) = FromValues::from_values(values).unwrap();
        assert_eq!(s, "x");
        assert_eq!(n, 7);
    }

    #[test]
    fn tuple_arity_is_checked() {
        let err = <(i64, i64)>::from_values(vec![Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            SerializeError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn no_coercion_between_kinds() {
        let err = <(f64,)>::from_values(vec![Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            SerializeError::TypeMismatch {
                field: 0,
                expected: ValueKind::Float,
                actual: ValueKind::Int
            }
        );
    }

    #[test]
    fn narrowing_reports_range() {
        let err = <(i64, u32)>::from_values(vec![Value::Int(0), Value::Int(-1)]).unwrap_err();
        assert!(matches!(
            err,
            SerializeError::OutOfRange {
                field: 1,
                value: -1,
                target: "u32"
            }
        ));
    }

    #[test]
    fn json_form_is_untagged() {
        let values = vec![Value::from("a"), Value::Int(1), Value::Float(0.5)];
        assert_eq!(
            serde_json::to_string(&values).unwrap(),
            r#"["a",1,0.5]"#
        );
    }
}
