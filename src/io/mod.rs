pub mod config_file;
pub mod log_merge;
pub mod param_table;

pub use config_file::*;
pub use log_merge::*;
