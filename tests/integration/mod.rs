//! Integration tests for memtrail
//!
//! These tests drive trace loading, reconstruction and the CLI end to end.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod explorer_cache;
pub mod ingest_flow;
