pub mod config;
pub mod recover;
pub mod session;
pub mod stats;
