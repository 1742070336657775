pub mod build;
pub mod inspect;
pub mod plan;
pub mod worker;
