//! Test Helper Utilities
//!
//! Shared utilities for testing reqdesk-ai

#![allow(dead_code)]

pub mod app;
pub mod oracle;

pub use app::{body_json, call, seed_tagged_request, test_state, test_state_with_limit};
pub use oracle::{prompt_kind, topical_oracle, PromptKind, ScriptedOracle};
