pub mod command;
pub mod dfs;
pub mod diagnostics;
pub mod file;
pub mod job;
pub mod manifest;
pub mod run_dir;
pub mod system;
pub mod tasks;
