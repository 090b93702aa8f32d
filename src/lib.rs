//! Tabbie - pomodoro timer with reload-safe session state
//!
//! This library provides the timer core, its persistence and the CLI that drives it.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pomodoro;
