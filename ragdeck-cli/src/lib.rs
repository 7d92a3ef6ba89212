//! Command-line front-end for [`ragdeck`].
//!
//! The binary is a thin wrapper over [`commands::run`]; the pieces live in a
//! library so they can be tested without spawning a process.

#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod telemetry;
