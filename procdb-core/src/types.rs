//! Argument type tags

use serde::{Deserialize, Serialize};

/// Type tag of a procedure argument or return value.
///
/// The discriminant is the wire code used by the plug-in protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArgType {
    Int32 = 0,
    Float = 1,
    String = 2,
    StringArray = 3,
    Int32Array = 4,
    FloatArray = 5,
    Int8Array = 6,
    Color = 7,
    Image = 8,
    Drawable = 9,
    Layer = 10,
    Channel = 11,
    Vectors = 12,
}

impl ArgType {
    pub const ALL: [ArgType; 13] = [
        ArgType::Int32,
        ArgType::Float,
        ArgType::String,
        ArgType::StringArray,
        ArgType::Int32Array,
        ArgType::FloatArray,
        ArgType::Int8Array,
        ArgType::Color,
        ArgType::Image,
        ArgType::Drawable,
        ArgType::Layer,
        ArgType::Channel,
        ArgType::Vectors,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Tag name as printed in signatures
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Int32 => "INT32",
            ArgType::Float => "FLOAT",
            ArgType::String => "STRING",
            ArgType::StringArray => "STRINGARRAY",
            ArgType::Int32Array => "INT32ARRAY",
            ArgType::FloatArray => "FLOATARRAY",
            ArgType::Int8Array => "INT8ARRAY",
            ArgType::Color => "COLOR",
            ArgType::Image => "IMAGE",
            ArgType::Drawable => "DRAWABLE",
            ArgType::Layer => "LAYER",
            ArgType::Channel => "CHANNEL",
            ArgType::Vectors => "VECTORS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Object kind carried by this tag, if it is an object tag
    pub fn object_kind(self) -> Option<ObjectKind> {
        match self {
            ArgType::Image => Some(ObjectKind::Image),
            ArgType::Drawable => Some(ObjectKind::Drawable),
            ArgType::Layer => Some(ObjectKind::Layer),
            ArgType::Channel => Some(ObjectKind::Channel),
            ArgType::Vectors => Some(ObjectKind::Vectors),
            _ => None,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            ArgType::StringArray | ArgType::Int32Array | ArgType::FloatArray | ArgType::Int8Array
        )
    }
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a live object referenced by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Image,
    /// Abstract kind: any layer or channel
    Drawable,
    Layer,
    Channel,
    Vectors,
}

impl ObjectKind {
    pub fn arg_type(self) -> ArgType {
        match self {
            ObjectKind::Image => ArgType::Image,
            ObjectKind::Drawable => ArgType::Drawable,
            ObjectKind::Layer => ArgType::Layer,
            ObjectKind::Channel => ArgType::Channel,
            ObjectKind::Vectors => ArgType::Vectors,
        }
    }

    /// Whether an object of kind `actual` satisfies a request for `self`
    pub fn accepts(self, actual: ObjectKind) -> bool {
        match self {
            ObjectKind::Drawable => matches!(
                actual,
                ObjectKind::Drawable | ObjectKind::Layer | ObjectKind::Channel
            ),
            other => other == actual,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Image => "image",
            ObjectKind::Drawable => "drawable",
            ObjectKind::Layer => "layer",
            ObjectKind::Channel => "channel",
            ObjectKind::Vectors => "vectors",
        }
    }
}

/// Kind of procedure, which decides how the dispatcher runs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    /// Compiled into the core, invoked in the caller's frame
    Internal = 0,
    /// Provided by an out-of-process plug-in
    Plugin = 1,
    /// Provided by a resident plug-in process
    Extension = 2,
    /// Installed at runtime by a running plug-in, gone when it exits
    Temporary = 3,
}

impl ProcedureKind {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ProcedureKind::Internal),
            1 => Some(ProcedureKind::Plugin),
            2 => Some(ProcedureKind::Extension),
            3 => Some(ProcedureKind::Temporary),
            _ => None,
        }
    }

    /// Whether calls are routed through the plug-in bridge
    pub fn is_out_of_process(self) -> bool {
        !matches!(self, ProcedureKind::Internal)
    }
}

impl std::fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcedureKind::Internal => "internal",
            ProcedureKind::Plugin => "plug-in",
            ProcedureKind::Extension => "extension",
            ProcedureKind::Temporary => "temporary",
        };
        f.write_str(s)
    }
}
