//! Command-line driver for hypogen.
//!
//! `hypogen generate` builds a bank and runs the update loop;
//! `hypogen infer` evaluates a saved bank on the test or validation split.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command};
