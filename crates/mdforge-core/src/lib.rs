//! # mdforge Core Library
//!
//! Builds a normalized, per-molecule archive dataset out of raw molecular-dynamics output
//! (per-protein trajectory files at several temperatures and replicas), processing a large
//! population of molecules in parallel and resuming safely after partial failures.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout:
//!
//! - **[`core`]: The Foundation.** Stateless data: the hierarchical archive model
//!   (`Group`, `Dataset`, `AttrValue`), structure and trajectory readers, and small
//!   chemistry/geometry helpers.
//!
//! - **[`engine`]: The Logic Core.** The batch scheduler, the molecule builder, the atomic
//!   writer, the parallel driver and the collaborator traits through which trajectory
//!   discovery and analysis are plugged in.
//!
//! - **[`workflows`]: The Public API.** Ties an identifier list, a run configuration and a
//!   batch worker together into a complete, resumable build.

pub mod core;
pub mod engine;
pub mod workflows;
