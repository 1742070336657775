//! # Engine Module
//!
//! The resumable, batch-parallel build pipeline.
//!
//! ## Overview
//!
//! The full workload (one unit of work per molecule identifier) is partitioned into
//! fixed-size, index-addressable batches. A fixed-size pool of workers executes one batch
//! per task; inside a batch, molecules are built strictly sequentially. Each molecule is
//! assembled in a private scratch archive and published atomically, so the archive
//! directory only ever contains complete files and a re-run skips everything that is
//! already there.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run window, worker pool, paths, naming and quantity selection
//! - **Scheduling** ([`schedule`]) - Identifier list and the deterministic batch partition
//! - **Building** ([`builder`]) - Per-molecule orchestration over all temperatures and replicas
//! - **Publishing** ([`writer`]) - Scratch archives and their atomic publication
//! - **Dispatch** ([`driver`]) - The worker abstraction and the parallel, fail-fast driver
//! - **Collaborators** ([`collaborators`]) - Trajectory discovery and analysis seams
//! - **Reporting** ([`report`], [`progress`]) - Outcome ledger, run summary and progress events
//! - **Error Handling** ([`error`]) - Recoverable and systemic error types
//!
//! ## Error Policy
//!
//! Recoverable conditions are contained at the smallest possible scope: a failed replica
//! is logged and omitted, a molecule with missing input is skipped. Only systemic errors
//! (unwritable output, invalid configuration, a crashed worker) cross the batch boundary,
//! and the first of them aborts the run.

pub mod builder;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod progress;
pub mod report;
pub mod schedule;
pub mod writer;
