//! Shared types for Olaf

pub mod error;

pub use error::{OlafError, Result};
