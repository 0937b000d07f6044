//! # reqdesk Common Library
//!
//! Shared code for the reqdesk services:
//! - Database schema and row models
//! - Pipeline event types and EventBus
//! - Configuration loading
//! - Id and timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
