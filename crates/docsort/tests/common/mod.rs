//! Shared test utilities for docsort integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temp input, output and report folders
//! - Stub extractor and classifier so runs are deterministic and offline
//! - A tiny lopdf builder for real PDFs with embedded text

pub mod harness;
pub mod stubs;

pub use harness::{TestHarness, DEFAULT_ROUTING};
pub use stubs::*;
