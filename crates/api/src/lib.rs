//! PixelForge API server library.
//!
//! Exposes the Job Service, the HTTP surface and the Live Connection
//! Registry so integration tests and the binary entrypoint can both build
//! the same application.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod state;
pub mod ws;
