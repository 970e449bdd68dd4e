//! Shared type definitions
//!
//! This module contains all shared data types used across the application.

pub mod config;
pub mod message;
pub mod model;

pub use config::GenerationParams;
pub use message::{Message, Role};
pub use model::CachedModel;
