//! Anthropic-shaped context editing: wire types, conversion, HTTP client.

pub mod client;
pub mod convert;
pub mod types;

pub use client::RemoteContextEditor;
pub use convert::{SYSTEM_MARKER, from_wire, restore_roles, to_wire};
pub use types::{
    AppliedEdit, EditDirective, EditRequest, EditResponse, SystemBlock, Threshold, WireBlock,
    WireContent, WireConversation, WireMessage, WireRole,
};
