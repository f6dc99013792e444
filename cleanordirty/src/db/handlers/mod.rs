//! Repository implementations.

pub mod dishwashers;

pub use dishwashers::{Dishwashers, UpdateOutcome};
