//! Subcommand modules for the `cmplx` binary.

pub mod report;
