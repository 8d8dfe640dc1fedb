//! Shared helpers for executor integration tests.

pub mod recorder;
