//! Shared error types and filesystem helpers.

pub mod errors;
pub mod paths;
