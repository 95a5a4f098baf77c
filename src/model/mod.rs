//! Core data model
//!
//! Entities being collected for, the source types that scope a run, and the
//! records and candidates flowing out of crawl sessions.

mod entity;
mod record;
mod source;

pub use entity::Entity;
pub use record::{Candidate, Record};
pub use source::SourceType;
