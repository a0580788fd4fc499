//! Consolidated test modules.
//!
//! This module contains end-to-end tests that drive the retention engine from
//! a TOML configuration against real temporary directories.
