//! Discord interaction handlers
//!
//! This module provides handlers for Discord interactions that are not
//! commands: autocomplete and gateway events.

/// Autocomplete handlers for character names
pub mod autocomplete;
/// Gateway event handler feeding chat messages into the training engine
pub mod events;
