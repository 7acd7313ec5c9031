// src/apply/mod.rs

//! Client-side package application
//!
//! [`Applier`] is the verify-then-commit pipeline over a downloaded
//! package; [`UpdateController`] wraps it with the full-package fallback
//! for installations that have drifted from their expected state.

mod applier;
mod fallback;

pub use applier::Applier;
pub use fallback::{ConfirmCallback, UpdateController};
