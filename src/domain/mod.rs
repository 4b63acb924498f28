//! Storefront domain model: aggregates, value objects, events and reports.

pub mod aggregates;
pub mod events;
pub mod reports;
pub mod value_objects;

use thiserror::Error;

/// A stored or submitted enum value that does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self { Self { kind, value: value.to_string() } }
}
