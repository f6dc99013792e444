//! HTTP surface: request handlers and their JSON models.

pub mod handlers;
pub mod models;
