//! Wire message catalog.
//!
//! Every message is framed as `u16 magic | u8 tag | payload`. Tags are grouped
//! by category:
//! - **0..=23**: scalars, object references, vector/matrix, exceptions
//! - **101..=109**: arrays, offset by [`ARRAY_OFFSET`] from their scalar tag
//! - **201..=213**: control/RPC requests and the template reply

use std::fmt;

use crate::data::{Matrix, Vector};

/// Leading constant of every framed message.
pub const MAGIC: u16 = 0xd00d;

/// Distance between a scalar tag and the tag of its array form.
pub const ARRAY_OFFSET: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    Bool = 1,
    Byte = 2,
    Int32 = 5,
    Int64 = 6,
    Float64 = 7,
    String = 8,
    Object = 9,

    Vector = 21,
    Matrix = 22,
    Exception = 23,

    BoolArray = 101,
    ByteArray = 102,
    Int32Array = 105,
    Int64Array = 106,
    Float64Array = 107,
    StringArray = 108,
    ObjectArray = 109,

    Create = 201,
    CallStaticMethod = 202,
    CallMethod = 203,
    GetProperty = 204,
    GetIndexedProperty = 205,
    GetIndexed = 206,
    SetProperty = 207,
    GetStaticProperty = 208,
    SetStaticProperty = 209,
    Protect = 210,
    Release = 211,
    TemplateReq = 212,
    TemplateReply = 213,
}

impl Tag {
    pub const ALL: [Tag; 31] = [
        Tag::Null,
        Tag::Bool,
        Tag::Byte,
        Tag::Int32,
        Tag::Int64,
        Tag::Float64,
        Tag::String,
        Tag::Object,
        Tag::Vector,
        Tag::Matrix,
        Tag::Exception,
        Tag::BoolArray,
        Tag::ByteArray,
        Tag::Int32Array,
        Tag::Int64Array,
        Tag::Float64Array,
        Tag::StringArray,
        Tag::ObjectArray,
        Tag::Create,
        Tag::CallStaticMethod,
        Tag::CallMethod,
        Tag::GetProperty,
        Tag::GetIndexedProperty,
        Tag::GetIndexed,
        Tag::SetProperty,
        Tag::GetStaticProperty,
        Tag::SetStaticProperty,
        Tag::Protect,
        Tag::Release,
        Tag::TemplateReq,
        Tag::TemplateReply,
    ];

    /// Wire code of this tag.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Tag for a wire code, if known.
    pub fn from_code(code: u8) -> Option<Tag> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// The array form of a scalar tag, if one exists.
    pub fn array_of(self) -> Option<Tag> {
        match self {
            Tag::Bool | Tag::Byte | Tag::Int32 | Tag::Int64 | Tag::Float64 | Tag::String | Tag::Object => {
                Self::from_code(self.code() + ARRAY_OFFSET)
            }
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        self.code() > 200
    }
}

/// Reference to an object living in the remote runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: i32,
    pub classname: Option<String>,
}

impl ObjectRef {
    pub fn new(id: i32, classname: Option<String>) -> Self {
        Self { id, classname }
    }
}

/// Member names reported by the remote runtime for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateInfo {
    pub properties: Vec<String>,
    pub methods: Vec<String>,
    pub static_methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Null,
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Object(ObjectRef),

    Vector(Vector),
    Matrix(Matrix),
    /// Text describing a failure inside the remote runtime.
    Exception(String),

    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
    StringArray(Vec<String>),
    ObjectArray(Vec<Message>),

    Create {
        classname: String,
        args: Vec<Message>,
    },
    CallStaticMethod {
        classname: String,
        method: String,
        args: Vec<Message>,
    },
    CallMethod {
        object_id: i32,
        method: String,
        args: Vec<Message>,
    },
    GetProperty {
        object_id: i32,
        property: String,
    },
    GetIndexedProperty {
        object_id: i32,
        property: String,
        index: i32,
    },
    GetIndexed {
        object_id: i32,
        index: i32,
    },
    SetProperty {
        object_id: i32,
        property: String,
        value: Box<Message>,
    },
    GetStaticProperty {
        classname: String,
        property: String,
    },
    SetStaticProperty {
        classname: String,
        property: String,
        value: Box<Message>,
    },
    Protect {
        object_id: i32,
    },
    Release {
        object_id: i32,
    },
    TemplateReq {
        classname: String,
    },
    TemplateReply(TemplateInfo),
}

impl Message {
    /// Wire tag for this message.
    pub fn tag(&self) -> Tag {
        match self {
            Message::Null => Tag::Null,
            Message::Bool(_) => Tag::Bool,
            Message::Byte(_) => Tag::Byte,
            Message::Int32(_) => Tag::Int32,
            Message::Int64(_) => Tag::Int64,
            Message::Float64(_) => Tag::Float64,
            Message::String(_) => Tag::String,
            Message::Object(_) => Tag::Object,
            Message::Vector(_) => Tag::Vector,
            Message::Matrix(_) => Tag::Matrix,
            Message::Exception(_) => Tag::Exception,
            Message::BoolArray(_) => Tag::BoolArray,
            Message::ByteArray(_) => Tag::ByteArray,
            Message::Int32Array(_) => Tag::Int32Array,
            Message::Int64Array(_) => Tag::Int64Array,
            Message::Float64Array(_) => Tag::Float64Array,
            Message::StringArray(_) => Tag::StringArray,
            Message::ObjectArray(_) => Tag::ObjectArray,
            Message::Create { .. } => Tag::Create,
            Message::CallStaticMethod { .. } => Tag::CallStaticMethod,
            Message::CallMethod { .. } => Tag::CallMethod,
            Message::GetProperty { .. } => Tag::GetProperty,
            Message::GetIndexedProperty { .. } => Tag::GetIndexedProperty,
            Message::GetIndexed { .. } => Tag::GetIndexed,
            Message::SetProperty { .. } => Tag::SetProperty,
            Message::GetStaticProperty { .. } => Tag::GetStaticProperty,
            Message::SetStaticProperty { .. } => Tag::SetStaticProperty,
            Message::Protect { .. } => Tag::Protect,
            Message::Release { .. } => Tag::Release,
            Message::TemplateReq { .. } => Tag::TemplateReq,
            Message::TemplateReply(_) => Tag::TemplateReply,
        }
    }

    /// Integer message sized by magnitude: Int32 when the value fits in 32
    /// signed bits, Int64 otherwise.
    pub fn int(v: i64) -> Message {
        match i32::try_from(v) {
            Ok(small) => Message::Int32(small),
            Err(_) => Message::Int64(v),
        }
    }

    /// Object id this request addresses, if it targets an instance.
    pub fn object_id(&self) -> Option<i32> {
        match self {
            Message::CallMethod { object_id, .. }
            | Message::GetProperty { object_id, .. }
            | Message::GetIndexedProperty { object_id, .. }
            | Message::GetIndexed { object_id, .. }
            | Message::SetProperty { object_id, .. }
            | Message::Protect { object_id }
            | Message::Release { object_id } => Some(*object_id),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Null => write!(f, "null"),
            Message::Bool(v) => write!(f, "{v}"),
            Message::Byte(v) => write!(f, "{v}"),
            Message::Int32(v) => write!(f, "{v}"),
            Message::Int64(v) => write!(f, "{v}"),
            Message::Float64(v) => write!(f, "{v}"),
            Message::String(v) => write!(f, "{v:?}"),
            Message::Object(r) => match &r.classname {
                Some(name) => write!(f, "<{name}: {}>", r.id),
                None => write!(f, "<object: {}>", r.id),
            },
            Message::Exception(text) => write!(f, "exception: {text}"),
            other => write!(f, "{:?} message", other.tag()),
        }
    }
}
