//! HTTP request handlers.

pub mod dishwashers;
