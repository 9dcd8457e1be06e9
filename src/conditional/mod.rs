//! Conditional requests (RFC 7232).
//!
//! # Responsibilities
//! - Parse and format entity tags
//! - Decide whether a request's validators short-circuit to 304 or 412
//!
//! # Data Flow
//! ```text
//! Handler ──► request.preconditions() ──► evaluate(last_modified, tag)
//!                                           │
//!                              None ◄───────┴───────► Some(304 | 412)
//! ```
//!
//! # Design Decisions
//! - Evaluation is opt-in per handler; the dispatcher never evaluates on its own
//! - Dates compare at one-second resolution after truncating the resource time

pub mod entity_tag;
pub mod preconditions;

pub use entity_tag::{EntityTag, EntityTagError};
pub use preconditions::Preconditions;
