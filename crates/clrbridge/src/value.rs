//! Native values exchanged with the bridge.
//!
//! Arguments are given as [`Value`]s and converted to wire messages by the
//! [`crate::registry::TypeRegistry`]; replies are resolved back into `Value`s
//! by the session, with object references becoming [`RemoteObject`] proxies.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::data::{Matrix, Vector};
use crate::proxy::RemoteObject;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    /// Any integer; sent as Int32 or Int64 depending on magnitude.
    Int(i64),
    Float(f64),
    String(String),
    Object(RemoteObject),

    BoolArray(Vec<bool>),
    Bytes(Vec<u8>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
    StringArray(Vec<String>),
    /// Heterogeneous list, sent as an object array.
    List(Vec<Value>),
    Vector(Vector),
    Matrix(Matrix),
}

impl Value {
    /// Zero-dimensional values (everything but arrays, tables and objects).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Byte(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::String(_)
        )
    }

    /// Anything that can be indexed. Remote objects count, since the remote
    /// side supports indexed access on them.
    pub fn is_sequence(&self) -> bool {
        !self.is_scalar()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::BoolArray(_) => "bool array",
            Value::Bytes(_) => "byte array",
            Value::Int32Array(_) => "int32 array",
            Value::Int64Array(_) => "int64 array",
            Value::Float64Array(_) => "float64 array",
            Value::StringArray(_) => "string array",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Byte(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<RemoteObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<RemoteObject> for Value {
    fn from(v: RemoteObject) -> Self {
        Value::Object(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BoolArray(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int32Array(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Int64Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Float64Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

impl From<Matrix> for Value {
    fn from(v: Matrix) -> Self {
        Value::Matrix(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Object(o) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("object", &o.id())?;
                map.serialize_entry("class", &o.classname())?;
                map.end()
            }
            Value::BoolArray(v) => serializer.collect_seq(v),
            Value::Bytes(v) => serializer.collect_seq(v),
            Value::Int32Array(v) => serializer.collect_seq(v),
            Value::Int64Array(v) => serializer.collect_seq(v),
            Value::Float64Array(v) => serializer.collect_seq(v),
            Value::StringArray(v) => serializer.collect_seq(v),
            Value::List(v) => serializer.collect_seq(v),
            Value::Vector(v) => v.serialize(serializer),
            Value::Matrix(m) => m.serialize(serializer),
        }
    }
}
