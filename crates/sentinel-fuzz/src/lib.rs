//! Fuzzing library for workspace-mcp-oauth.
//!
//! This crate provides fuzzing targets for the untrusted inputs of the state
//! store: the persisted state file and pasted callback URLs.
//!
//! # Usage
//!
//! ```bash
//! cd crates/sentinel-fuzz
//! cargo +nightly fuzz run fuzz_state_file -- -max_total_time=60
//! ```

pub use workspace_mcp_oauth::oauth::{CallbackParams, persist::parse_table};
