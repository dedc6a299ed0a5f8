//! Utility helpers: child environment isolation.
pub mod env;

pub use env::EnvIsolator;
