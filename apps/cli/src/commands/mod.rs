//! Command implementations for the mlforge CLI.

pub mod artifact;
