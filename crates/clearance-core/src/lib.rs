pub mod classify;
pub mod config;
pub mod findings;
pub mod rollup;
pub mod scan;
pub mod types;

pub use config::{Config, Project, Subproject};
pub use rollup::rollup_project_status;
pub use types::*;
