pub mod config;
pub mod defs;

pub use config::{Config, FetchOpt};
pub use defs::*;
