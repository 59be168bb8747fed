//! Shared plumbing for destination adapters: the error taxonomy surfaced to the
//! routing framework, payload flattening, mapping-configuration resolution, the
//! per-transaction key/value context, and the explicit destination registry.

pub mod error;
pub mod flatten;
pub mod mapping;
pub mod registry;
pub mod transaction;
