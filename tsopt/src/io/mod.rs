//! I/O adapters for the step advancer.

pub mod backend;
pub mod config;
pub mod geom_log;
pub mod job_script;
pub mod modifier;
pub mod process;
pub mod reaction_file;
pub mod solver;
pub mod template;
