//! coinpoll — periodic coin balance refresher.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod source;
pub mod display;
pub mod poller;
