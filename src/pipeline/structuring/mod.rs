//! Typed records from loosely-typed LLM output.
//!
//! `schema` declares per-field kinds and defaults; `validation` walks a raw
//! JSON value against that table and repairs it field by field.

pub mod schema;
pub mod validation;

pub use schema::*;
pub use validation::*;
