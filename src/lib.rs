//! Disk-space retention engine.
//!
//! Keeps a set of managed directories within per-category age and size
//! limits by periodically deleting the oldest matching files.

pub mod config;
pub mod observability;
pub mod retention;

#[cfg(test)]
mod tests;
