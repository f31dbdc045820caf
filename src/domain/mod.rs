//! Domain layer types and invariants.

pub mod error;
pub mod types;

pub use tootline_api_types::{Account, Status};
