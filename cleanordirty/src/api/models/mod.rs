//! API response models.

pub mod dishwashers;
