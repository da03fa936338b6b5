//! Host adapters that feed events into the guard.

pub mod cli;

pub use cli::{CliCommand, CliHost, CommandStream};
