//! Palaver is a terminal chat client for working with OpenAI-compatible LLM
//! APIs and pluggable tool-invocation servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the settings registry, persisted configuration, and the
//!   chat session state machine that drives each turn.
//! - [`commands`] implements slash-command lexing, completion, catalog
//!   resolution, and command execution used by the session.
//! - [`api`] defines chat payloads and the streaming client for
//!   OpenAI-compatible backends.
//! - [`mcp`] holds the tool-server and package-manager boundary traits and
//!   the manager that tracks tool-server sessions.
//! - [`ui`] defines the event interface the interface layer renders from;
//!   the core only emits structured events.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`), which
//! initializes settings, builds a [`core::session::ChatSession`], and runs
//! the line loop.

pub mod api;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod ui;
pub mod utils;
