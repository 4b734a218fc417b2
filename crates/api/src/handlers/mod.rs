pub mod auth;
pub mod formats;
pub mod jobs;
pub mod users;
