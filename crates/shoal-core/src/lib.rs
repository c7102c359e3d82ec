//! # shoal-core
//!
//! Core types shared by the shoal crates.
//!
//! This crate provides:
//! - [`WorkerId`] — opaque, cheaply clonable identity of a data-holding party
//! - [`Error`] / [`Result`] — the single error type used across shoal

pub mod error;
pub mod worker;

pub use error::{Error, Result};
pub use worker::WorkerId;
