pub mod config;
pub mod error;
pub mod procfs;
pub mod topology;

pub use config::SchedConfig;
pub use error::*;
