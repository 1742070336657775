pub mod chemistry;
pub mod geometry;
