//! CLI command implementations for cloudstats-agent.
//!
//! This module provides implementations for all CLI subcommands:
//! - `once`: Single cycle with report output
//! - `tree`: Flattened process listing
//! - `top`: Persisted top-K ranking
//! - `config`: Configuration file generation
//! - `generate`: Test data generation
//! - `check`: System validation

pub mod check;
pub mod config;
pub mod generate;
pub mod once;
pub mod top;
pub mod tree;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use once::command_once;
pub use top::command_top;
pub use tree::command_tree;
