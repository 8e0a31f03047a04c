//! Integration tests for Tally.

pub mod common;
pub mod guard_test;
pub mod pipeline_test;
pub mod store_test;
