//! CLI subcommands

pub mod analyze;
pub mod inspect;
pub mod show;
