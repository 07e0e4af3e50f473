//! The steps of a promotion run.

pub mod app;
pub mod discovery;
pub mod migrate;
pub mod validate;
