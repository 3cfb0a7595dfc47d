//! Shared types for the reka workspace: configuration, errors, the
//! conversational data model and structured trace events.

pub mod config;
pub mod error;
pub mod meta;
pub mod trace;
pub mod turn;

pub use error::{Error, Result};
pub use meta::InboundMeta;
pub use turn::{Role, Turn};
