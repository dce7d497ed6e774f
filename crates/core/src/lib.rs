//! Core domain types and shared logic for the registry sync service.
//!
//! This crate defines the pieces every other crate agrees on:
//! - Configuration, including the deployment environment overlay
//! - Canonical image targets (`repository`, `tag`)
//! - Registry event classification (push vs delete)
//! - Payload normalization over the supported webhook shapes

pub mod config;
pub mod error;
pub mod event;
pub mod image;
pub mod normalize;

pub use error::{Error, Result};
pub use event::EventKind;
pub use image::{DeleteTarget, ImageRef};
pub use normalize::{normalize_delete, normalize_push};
