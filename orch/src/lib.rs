//! Deterministic controller for AI-assisted code-change tasks.
//!
//! External model CLIs are replaceable, untrusted workers; the controller
//! guarantees that every task walks a fixed set of phases, respects hard
//! limits on what it may change, retries failures a bounded number of times,
//! and always lands in a small set of auditable terminal states. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, policy checks,
//!   path patterns). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (registry, git, processes, tmux,
//!   artifacts). Isolated to enable mocking in tests.
//! - **[`adapters`]** and **[`phases`]**: the model-facing boundary; every
//!   invocation is classified into success / recoverable failure / rate
//!   limit before the state machine sees it.
//!
//! [`engine`] coordinates core logic with I/O; the command modules
//! ([`start`], [`resume`], [`status`], [`kill`], [`clean`]) implement the
//! CLI on top of it.

pub mod adapters;
pub mod clean;
pub mod core;
pub mod engine;
pub mod io;
pub mod kill;
pub mod logging;
pub mod phases;
pub mod prompt;
pub mod resume;
pub mod start;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
