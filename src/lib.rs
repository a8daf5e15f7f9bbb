// Trajectory prediction with a learned safety score.
//
// Layers, outermost first:
//   cli → application → ml / data → infra → domain
//
// The binary in main.rs only installs logging and hands off to cli.

#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;
