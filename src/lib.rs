//! tradelog: strategy tester log analyzer.
//!
//! Hexagonal architecture: the analysis pipeline in [`domain`], port traits
//! in [`ports`], file-backed implementations in [`adapters`], and the
//! command-line front end in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
