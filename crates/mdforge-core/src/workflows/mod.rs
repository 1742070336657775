//! # Workflows Module
//!
//! High-level entry points that run a complete, resumable dataset build.
//!
//! ## Overview
//!
//! A workflow takes an identifier list and a run configuration, prepares the archive
//! directory, partitions the work into batches and hands those batches to a
//! [`BatchWorker`](crate::engine::driver::BatchWorker). Whether a worker builds in the
//! calling process or forwards batches to child processes is the caller's choice; the
//! workflow only sees the worker trait.
//!
//! ## Architecture
//!
//! - **Build Workflow** ([`build`]) - Planning, preparation, parallel execution and the
//!   final outcome report.

pub mod build;
