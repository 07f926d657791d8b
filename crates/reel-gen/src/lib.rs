//! Client for the external video-generation service.
//!
//! The service exposes an async-operation API: a generation request returns
//! an operation id, the operation is polled until done, and the finished
//! clip is downloaded. This crate wraps that flow behind the
//! [`ClipGenerator`] trait and maps service failures onto a typed
//! [`GenerationError`] taxonomy so the scheduler can tell a quota wall from
//! a transient fault.

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{ClipGenerator, HttpGenClient};
pub use config::GenConfig;
pub use error::{GenResult, GenerationError};
