//! Domain model structs and DTOs.
//!
//! - [`job`] -- the `jobs` row, its insert DTO and its status read model.
//! - [`task`] -- the `conversion_tasks` row backing the work queue.
//! - [`status`] -- closed status enumerations backed by lookup tables.
//! - [`user`] -- the `users` row and its public profile.

pub mod job;
pub mod status;
pub mod task;
pub mod user;
