//! Working memory: the per-(thread, resource) context document
//!
//! The document is owned by a [`ContextStore`]; handlers never merge into it
//! freely but go through the typed patch of the context they own.

pub mod memory;
pub mod patch;
pub mod store;

#[cfg(test)]
mod proptests;

pub use memory::{ContextMemory, ContextTag, InfoItem, PlanData, PlanStatus, WorkflowName};
pub use patch::ContextPatch;
pub use store::{load_or_reset, ContextError, ContextKey, ContextStore};
