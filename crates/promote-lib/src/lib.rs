//! Promote tagged BI content (reports, dashboards, data modules) from a
//! development content store to a production one.
//!
//! [`commands::app::Plan`] ties the pieces together: discovery finds the
//! tagged objects, the validator applies the promotion rules, and the
//! migrator creates or replaces objects in the destination, backing up what
//! it overwrites.

pub mod commands;
pub mod config;
pub mod domain;
pub mod infrastructure;
