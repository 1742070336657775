//! Readers (and, for trajectories, a writer) for the molecular file formats consumed by
//! the built-in analysis collaborator.

pub mod dcd;
pub mod pdb;
