//! Runtime values passed to and returned from procedures
//!
//! Every value carries its own tag, so arrays are homogeneous by
//! construction and a value can always report the `ArgType` it satisfies.

use crate::{ArgType, ObjectKind};
use serde::{Deserialize, Serialize};

/// RGBA color with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "opaque")]
    pub a: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn components(&self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// All components finite and within [0, 1]
    pub fn is_normalized(&self) -> bool {
        self.components().iter().all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

/// Reference to a live object by kind and integer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub id: i32,
}

impl ObjectId {
    /// Id meaning "no object", accepted only by parameters that allow it
    pub const NONE: i32 = -1;

    pub fn new(kind: ObjectKind, id: i32) -> Self {
        Self { kind, id }
    }

    pub fn none(kind: ObjectKind) -> Self {
        Self { kind, id: Self::NONE }
    }

    pub fn is_none(&self) -> bool {
        self.id == Self::NONE
    }
}

/// Runtime value of a procedure argument or return slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum Value {
    Int32(i32),
    Float(f64),
    String(String),
    StringArray(Vec<String>),
    Int32Array(Vec<i32>),
    FloatArray(Vec<f64>),
    Int8Array(Vec<u8>),
    Color(Color),
    Object(ObjectId),
}

impl Value {
    // ========== Constructors ==========

    pub fn image(id: i32) -> Self {
        Value::Object(ObjectId::new(ObjectKind::Image, id))
    }

    pub fn drawable(id: i32) -> Self {
        Value::Object(ObjectId::new(ObjectKind::Drawable, id))
    }

    pub fn layer(id: i32) -> Self {
        Value::Object(ObjectId::new(ObjectKind::Layer, id))
    }

    pub fn channel(id: i32) -> Self {
        Value::Object(ObjectId::new(ObjectKind::Channel, id))
    }

    pub fn vectors(id: i32) -> Self {
        Value::Object(ObjectId::new(ObjectKind::Vectors, id))
    }

    // ========== Safe Accessors (never panic) ==========

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::Int32Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            Value::FloatArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Int8Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }

    /// Object id regardless of the kind it was tagged with
    pub fn object_id(&self) -> Option<i32> {
        self.as_object().map(|o| o.id)
    }

    /// Tag this value satisfies
    pub fn arg_type(&self) -> ArgType {
        match self {
            Value::Int32(_) => ArgType::Int32,
            Value::Float(_) => ArgType::Float,
            Value::String(_) => ArgType::String,
            Value::StringArray(_) => ArgType::StringArray,
            Value::Int32Array(_) => ArgType::Int32Array,
            Value::FloatArray(_) => ArgType::FloatArray,
            Value::Int8Array(_) => ArgType::Int8Array,
            Value::Color(_) => ArgType::Color,
            Value::Object(o) => o.kind.arg_type(),
        }
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        self.arg_type().name()
    }

    /// Element count for arrays, byte length for strings
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::StringArray(a) => Some(a.len()),
            Value::Int32Array(a) => Some(a.len()),
            Value::FloatArray(a) => Some(a.len()),
            Value::Int8Array(a) => Some(a.len()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int32(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::StringArray(items) => {
                let contents: Vec<String> = items.iter().map(|s| format!("{:?}", s)).collect();
                write!(f, "[{}]", contents.join(", "))
            }
            Value::Int32Array(items) => write_list(f, items),
            Value::FloatArray(items) => write_list(f, items),
            Value::Int8Array(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Value::Object(o) => write!(f, "{}#{}", o.kind.name(), o.id),
        }
    }
}

fn write_list<T: std::fmt::Display>(f: &mut std::fmt::Formatter<'_>, items: &[T]) -> std::fmt::Result {
    // Show values for small arrays, count for large
    if items.len() <= 8 {
        let contents: Vec<String> = items.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", contents.join(", "))
    } else {
        write!(f, "[{} items]", items.len())
    }
}

// From implementations for convenience
impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int32(if b { 1 } else { 0 })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int32Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatArray(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Int8Array(v)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<ObjectId> for Value {
    fn from(o: ObjectId) -> Self {
        Value::Object(o)
    }
}
