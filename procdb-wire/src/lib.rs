//! procdb Wire - Plug-in protocol
//!
//! `codec` frames messages over any async byte stream. `plugin` is the
//! runtime a plug-in program links against to answer the host.

pub mod codec;
pub mod plugin;

pub use codec::{encode, read_message, write_message, Message, WireError, PROTOCOL_VERSION};
pub use plugin::{FnProc, PluginLink, PluginMain, PluginProc};
