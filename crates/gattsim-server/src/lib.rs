//! # gattsim-server
//!
//! HTTP host for the gattsim peripheral emulator.
//!
//! This library provides the API handlers and state management around a
//! running peripheral task.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
