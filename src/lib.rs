// Library exports for the Paddock process supervisor

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ipc;
pub mod lifecycle;
pub mod logging;
pub mod process;
pub mod status;
