//! Command-line surface.

mod commands;
mod display;

pub use commands::{Cli, Commands, EngineArg, RunArgs};
pub use display::Display;
