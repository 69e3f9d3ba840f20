//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod file_log_adapter;
pub mod markdown_report_adapter;
