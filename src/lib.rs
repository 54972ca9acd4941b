//! orgscan — finds GitHub organizations in uploaded documents.

pub mod config;
pub mod directory;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod store;
pub mod uploads;
