//! Dependency cascade: count, soft-delete or delete a root entity together
//! with every record that references it.

pub mod error;
pub mod report;
pub mod resolver;

pub use error::CascadeError;
pub use report::{Report, ReportConvention, SelfReferencePolicy};
pub use resolver::{CascadeOptions, CascadeResolver, Operation};
