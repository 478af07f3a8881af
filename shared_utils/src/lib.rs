//! Small helpers shared by the workspace crates: environment lookups and
//! plain-text settings files.

pub mod env;
pub mod settings;
