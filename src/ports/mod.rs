//! Trait seams between the analysis pipeline and the outside world.

pub mod config_port;
pub mod log_port;
pub mod report_port;
