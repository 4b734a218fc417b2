//! Conversion worker: drains the task queue and drives each job through
//! `PENDING -> PROCESSING -> {SUCCESS, FAILED}`, publishing a status event
//! after every committed transition.

pub mod codec;
pub mod config;
pub mod converter;
pub mod error;
pub mod publisher;
pub mod runner;
pub mod supervisor;
