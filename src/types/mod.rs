//! Core data types: column-keyed entries and message codes

pub mod codes;
pub mod entry;

pub use codes::{Code, CodeTable, CodedError};
pub use entry::{Entry, COLUMNS};
