//! The ownership analyses run over a lowered IR module.

pub(crate) mod bit_set;
pub(crate) mod cfg;
pub mod classifier;
pub mod conventions;
pub mod destructors;
pub mod exclusivity;
pub mod origins;
pub mod ownership_checker;
