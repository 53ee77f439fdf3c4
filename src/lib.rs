//! Command-line glue for `wminfo`: argument parsing, environment
//! overrides, logging and report rendering. The inventory logic lives
//! in the `wminfo-vsphere` crate.

pub mod cli;
pub mod config;
pub mod logging;
pub mod render;
