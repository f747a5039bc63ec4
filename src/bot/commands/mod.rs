//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Character registration commands
pub mod character;

/// General utility commands
pub mod general;

/// Training session and review commands
pub mod training;

// Export commands
pub use character::*;
pub use general::*;
pub use training::*;
