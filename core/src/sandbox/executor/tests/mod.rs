//! Tests for the sandbox executor
//!
//! Organized by branch and concern

mod chart_tests;
mod data_tests;
mod fence_tests;
mod helpers;
mod limit_tests;
