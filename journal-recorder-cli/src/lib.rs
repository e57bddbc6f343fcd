pub mod cli;
pub mod load_config;

pub use cli::{run, run_until, Cli, Commands};
