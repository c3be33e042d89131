//! In-memory collaborators
//!
//! A loopback relay and a filter registry that live entirely in process.
//! They honour the collaborator contracts closely enough to drive the
//! transport end to end in tests and local runs.

pub mod registry;
pub mod relay;

pub use registry::MemoryFilterRegistry;
pub use relay::{MailServerReply, MemoryRelay};
