//! Bidirectional type dispatch between native values and wire messages.
//!
//! Two independent tables:
//! - **by tag**: wire tag -> empty message, used when decoding
//! - **value rules**: ordered (name, matcher, converter) triples, used when
//!   encoding native arguments; the first matching rule wins
//!
//! Rule order is part of the contract. A remote object is indexable, so the
//! `object` rule must run before the generic `array` rule, and scalars must be
//! claimed before anything multi-dimensional.

use std::collections::HashMap;

use crate::bridge::protocol::{Message, ObjectRef, Tag, TemplateInfo};
use crate::data::{Matrix, Vector};
use crate::error::{BridgeError, Result};
use crate::value::Value;

/// Builds an empty message of one variant, ready for `read_payload`.
pub type Constructor = fn() -> Message;
pub type Matcher = fn(&Value) -> bool;
pub type Converter = fn(&TypeRegistry, &Value) -> Result<Message>;

#[derive(Clone, Copy)]
pub struct ValueRule {
    pub name: &'static str,
    pub matches: Matcher,
    pub convert: Converter,
}

impl std::fmt::Debug for ValueRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRule").field("name", &self.name).finish()
    }
}

/// Registration happens once at startup; afterwards the registry is shared
/// read-only (typically behind an `Arc`).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_tag: HashMap<u8, Constructor>,
    rules: Vec<ValueRule>,
}

impl TypeRegistry {
    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry covering the full message catalog and the default value rules.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for tag in Tag::ALL {
            registry.register(tag, empty_message(tag));
        }
        registry.add_value_rule(ValueRule {
            name: "object",
            matches: |v| matches!(v, Value::Object(_)),
            convert: convert_object,
        });
        registry.add_value_rule(ValueRule {
            name: "scalar",
            matches: Value::is_scalar,
            convert: convert_scalar,
        });
        registry.add_value_rule(ValueRule {
            name: "array",
            matches: Value::is_sequence,
            convert: convert_array,
        });
        registry
    }

    /// Register (or replace) the constructor for a tag.
    pub fn register(&mut self, tag: Tag, ctor: Constructor) {
        if self.by_tag.insert(tag.code(), ctor).is_some() {
            tracing::debug!(?tag, "Replaced message constructor");
        }
    }

    /// Append a value rule; it is consulted after every rule already present.
    pub fn add_value_rule(&mut self, rule: ValueRule) {
        tracing::trace!(rule = rule.name, position = self.rules.len(), "Added value rule");
        self.rules.push(rule);
    }

    /// Value rules in match order.
    pub fn rules(&self) -> &[ValueRule] {
        &self.rules
    }

    /// Whether a constructor is registered for tag `code`.
    pub fn is_registered(&self, code: u8) -> bool {
        self.by_tag.contains_key(&code)
    }

    /// Instantiate the message registered for `code`, optionally filled from `value`.
    pub fn create_by_tag(&self, code: u8, value: Option<&Value>) -> Result<Message> {
        let ctor = self
            .by_tag
            .get(&code)
            .ok_or(BridgeError::UnknownTag(code))?;
        let mut msg = ctor();
        if let Some(value) = value {
            self.fill(&mut msg, value)?;
        }
        Ok(msg)
    }

    /// Convert a native value using the first rule that accepts it.
    pub fn create_by_value(&self, value: &Value) -> Result<Message> {
        let rule = self
            .rules
            .iter()
            .find(|rule| (rule.matches)(value))
            .ok_or_else(|| {
                BridgeError::unserializable(format!("no rule accepts a {}", value.kind()))
            })?;
        (rule.convert)(self, value)
    }

    /// Name of the rule that would convert `value`.
    pub fn classify(&self, value: &Value) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(value))
            .map(|rule| rule.name)
    }

    /// Convert a list of arguments in order.
    pub fn convert_args(&self, args: &[Value]) -> Result<Vec<Message>> {
        args.iter().map(|arg| self.create_by_value(arg)).collect()
    }

    fn fill(&self, msg: &mut Message, value: &Value) -> Result<()> {
        let tag = msg.tag();
        let mismatch = || {
            BridgeError::unserializable(format!("cannot build a {tag:?} message from a {}", value.kind()))
        };

        *msg = match (tag, value) {
            (Tag::Null, Value::Null) => Message::Null,
            (Tag::Bool, Value::Bool(v)) => Message::Bool(*v),
            (Tag::Byte, Value::Byte(v)) => Message::Byte(*v),
            (Tag::Byte, Value::Int(v)) => Message::Byte(u8::try_from(*v).map_err(|_| mismatch())?),
            (Tag::Int32, Value::Int(v)) => Message::Int32(i32::try_from(*v).map_err(|_| mismatch())?),
            (Tag::Int64, Value::Int(v)) => Message::Int64(*v),
            (Tag::Float64, Value::Float(v)) => Message::Float64(*v),
            (Tag::Float64, Value::Int(v)) => Message::Float64(*v as f64),
            (Tag::String, Value::String(v)) => Message::String(v.clone()),
            (Tag::Exception, Value::String(v)) => Message::Exception(v.clone()),
            (Tag::Object, Value::Object(_)) => convert_object(self, value)?,

            (Tag::BoolArray, Value::BoolArray(v)) => Message::BoolArray(v.clone()),
            (Tag::ByteArray, Value::Bytes(v)) => Message::ByteArray(v.clone()),
            (Tag::Int32Array, Value::Int32Array(v)) => Message::Int32Array(v.clone()),
            (Tag::Int64Array, Value::Int64Array(v)) => Message::Int64Array(v.clone()),
            (Tag::Int64Array, Value::Int32Array(v)) => {
                Message::Int64Array(v.iter().copied().map(i64::from).collect())
            }
            (Tag::Float64Array, Value::Float64Array(v)) => Message::Float64Array(v.clone()),
            (Tag::StringArray, Value::StringArray(v)) => Message::StringArray(v.clone()),
            (Tag::ObjectArray, Value::List(items)) => Message::ObjectArray(self.convert_args(items)?),
            (Tag::Vector, Value::Float64Array(v)) => Message::Vector(Vector::new(v.clone())),
            (Tag::Vector, Value::Vector(v)) => Message::Vector(v.clone()),
            (Tag::Matrix, Value::Matrix(m)) => Message::Matrix(m.clone()),
            _ => return Err(mismatch()),
        };
        Ok(())
    }
}

fn empty_message(tag: Tag) -> Constructor {
    match tag {
        Tag::Null => || Message::Null,
        Tag::Bool => || Message::Bool(false),
        Tag::Byte => || Message::Byte(0),
        Tag::Int32 => || Message::Int32(0),
        Tag::Int64 => || Message::Int64(0),
        Tag::Float64 => || Message::Float64(0.0),
        Tag::String => || Message::String(String::new()),
        Tag::Object => || Message::Object(ObjectRef::default()),
        Tag::Vector => || Message::Vector(Vector::default()),
        Tag::Matrix => || Message::Matrix(Matrix::default()),
        Tag::Exception => || Message::Exception(String::new()),
        Tag::BoolArray => || Message::BoolArray(Vec::new()),
        Tag::ByteArray => || Message::ByteArray(Vec::new()),
        Tag::Int32Array => || Message::Int32Array(Vec::new()),
        Tag::Int64Array => || Message::Int64Array(Vec::new()),
        Tag::Float64Array => || Message::Float64Array(Vec::new()),
        Tag::StringArray => || Message::StringArray(Vec::new()),
        Tag::ObjectArray => || Message::ObjectArray(Vec::new()),
        Tag::Create => || Message::Create {
            classname: String::new(),
            args: Vec::new(),
        },
        Tag::CallStaticMethod => || Message::CallStaticMethod {
            classname: String::new(),
            method: String::new(),
            args: Vec::new(),
        },
        Tag::CallMethod => || Message::CallMethod {
            object_id: 0,
            method: String::new(),
            args: Vec::new(),
        },
        Tag::GetProperty => || Message::GetProperty {
            object_id: 0,
            property: String::new(),
        },
        Tag::GetIndexedProperty => || Message::GetIndexedProperty {
            object_id: 0,
            property: String::new(),
            index: 0,
        },
        Tag::GetIndexed => || Message::GetIndexed {
            object_id: 0,
            index: 0,
        },
        Tag::SetProperty => || Message::SetProperty {
            object_id: 0,
            property: String::new(),
            value: Box::new(Message::Null),
        },
        Tag::GetStaticProperty => || Message::GetStaticProperty {
            classname: String::new(),
            property: String::new(),
        },
        Tag::SetStaticProperty => || Message::SetStaticProperty {
            classname: String::new(),
            property: String::new(),
            value: Box::new(Message::Null),
        },
        Tag::Protect => || Message::Protect { object_id: 0 },
        Tag::Release => || Message::Release { object_id: 0 },
        Tag::TemplateReq => || Message::TemplateReq {
            classname: String::new(),
        },
        Tag::TemplateReply => || Message::TemplateReply(TemplateInfo::default()),
    }
}

fn convert_object(_: &TypeRegistry, value: &Value) -> Result<Message> {
    match value {
        Value::Object(o) => Ok(Message::Object(o.handle()?)),
        other => Err(BridgeError::unserializable(format!(
            "object rule given a {}",
            other.kind()
        ))),
    }
}

fn convert_scalar(_: &TypeRegistry, value: &Value) -> Result<Message> {
    Ok(match value {
        Value::Null => Message::Null,
        Value::Bool(v) => Message::Bool(*v),
        Value::Byte(v) => Message::Byte(*v),
        Value::Int(v) => Message::int(*v),
        Value::Float(v) => Message::Float64(*v),
        Value::String(v) => Message::String(v.clone()),
        other => {
            return Err(BridgeError::unserializable(format!(
                "scalar rule given a {}",
                other.kind()
            )));
        }
    })
}

fn convert_array(registry: &TypeRegistry, value: &Value) -> Result<Message> {
    Ok(match value {
        Value::BoolArray(v) => Message::BoolArray(v.clone()),
        Value::Bytes(v) => Message::ByteArray(v.clone()),
        Value::Int32Array(v) => Message::Int32Array(v.clone()),
        Value::Int64Array(v) => Message::Int64Array(v.clone()),
        Value::Float64Array(v) => Message::Vector(Vector::new(v.clone())),
        Value::StringArray(v) => Message::StringArray(v.clone()),
        Value::List(items) => Message::ObjectArray(registry.convert_args(items)?),
        Value::Vector(v) => Message::Vector(v.clone()),
        Value::Matrix(m) => match m.as_column_vector() {
            Some(v) => Message::Vector(v),
            None => Message::Matrix(m.clone()),
        },
        other => {
            return Err(BridgeError::unserializable(format!(
                "array rule given a {}",
                other.kind()
            )));
        }
    })
}
