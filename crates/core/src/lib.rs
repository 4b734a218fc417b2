//! Shared domain primitives for the PixelForge conversion pipeline.
//!
//! Every other workspace crate depends on this one for the id/timestamp
//! aliases, the [`error::CoreError`] taxonomy, the supported
//! [`formats::ImageFormat`] enumeration, pagination math and storage key
//! generation.

pub mod error;
pub mod formats;
pub mod keys;
pub mod pagination;
pub mod types;
