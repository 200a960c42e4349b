//! Terraform template generation with a bounded generate/validate retry loop.
//!
//! A natural-language description goes to a generation agent; each candidate is
//! checked by a validation agent (or `terraform` directly) and rejected candidates
//! are retried with the accumulated feedback, at most three times.
//!
//! - **[`core`]**: Pure logic (session state machine, verdict normalization,
//!   provider schema rules). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, child processes, the working
//!   file, the `terraform` CLI, prompts).
//! - **[`agents`]**: Collaborator traits and their agent-CLI and tool backends.
//! - **[`controller`]**: The retry controller tying them together.

pub mod agents;
pub mod controller;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
