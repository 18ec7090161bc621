// ABOUTME: Library root for autodeploy - exposes the pipeline for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod decision;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod facts;
pub mod job;
pub mod logbus;
pub mod output;
pub mod patch;
pub mod process;
pub mod provision;
pub mod retry;
pub mod ssh;
pub mod types;
