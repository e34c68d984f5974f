//! Integration and unit tests for CloudIndex.
//!
//! ## Test Modules
//!
//! - **support**: shared fixtures (in-memory SQLite, scriptable remote drive, configs)
//! - **cache_tests**: node store reads, writes and tombstones
//! - **sync_tests**: full and incremental crawls against a fake remote drive
//! - **guard_tests**: per-account job exclusion
//! - **jobs_tests**: background triggers, status persistence and the scheduler
//! - **query_tests**: listings, password gates and search
//! - **download_tests**: download resolution for remote accounts
//! - **native_tests**: the local filesystem backend end to end
//! - **config_tests**: configuration loading and validation
//! - **error_tests**: error mapping and HTTP responses
//! - **db_tests**: schema and account status rows
//! - **api_tests**: the HTTP router with its middleware stack
//!
//! Individual modules can be run with e.g. `cargo test sync_tests`.

pub mod support;

pub mod cache_tests;
pub mod config_tests;
pub mod download_tests;
pub mod native_tests;
