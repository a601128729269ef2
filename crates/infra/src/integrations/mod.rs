//! External service integrations.

pub mod luminate;

pub use luminate::*;
