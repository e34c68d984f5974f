//! # CloudIndex
//!
//! Directory index over local folders and cloud-drive accounts. Each account's tree is
//! crawled into a SQLite cache, and listings, search and download resolution are served
//! from that cache over HTTP.
//!
//! ## Core Components
//!
//! - [`source`]: backend kinds, the remote connector trait and the native filesystem backend
//! - [`cache`]: the SQLite node store
//! - [`sync`]: full and incremental crawls, plus the per-account job guard
//! - [`query`]: path listings, README previews, search, hidden ids and folder passwords
//! - [`download`]: download target resolution
//! - [`jobs`]: background triggers and the scheduler
//! - [`routes`]: HTTP handlers and router assembly
//! - [`config`], [`db`], [`error`], [`metrics`], [`middleware`], [`state`], [`types`]

pub mod accounts;
pub mod cache;
pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod source;
pub mod state;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;
