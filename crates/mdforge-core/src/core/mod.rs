//! Stateless building blocks: the archive data model, file-format readers and
//! chemistry/geometry utilities.

pub mod archive;
pub mod io;
pub mod utils;
