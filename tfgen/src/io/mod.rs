//! Side-effecting adapters: files, child processes, prompts.

pub mod attempt_log;
pub mod config;
pub mod executor;
pub mod process;
pub mod prompt;
pub mod terraform;
pub mod workspace;
