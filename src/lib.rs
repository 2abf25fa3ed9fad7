//! Archway - cross-architecture container builds
//!
//! Registers emulation with a container runtime, builds images from a
//! script with content-addressed caching, and runs commands in them.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestration;
pub mod ui;

pub use error::{ArchwayError, ArchwayResult};
