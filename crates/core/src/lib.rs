//! `adaas-core`: shared building blocks for the analytics client.
//!
//! Tabular cells/rows and strongly-typed identifiers. No I/O lives here.

pub mod error;
pub mod id;
pub mod value;

pub use error::{DomainError, DomainResult};
pub use id::{DatasetId, JobId};
pub use value::{Cell, Dataset, Row};
