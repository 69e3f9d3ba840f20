//! Pure analysis pipeline: decoding, event extraction, trade reconstruction,
//! equity folding and metrics.

pub mod config_validation;
pub mod correlation;
pub mod deals;
pub mod decoder;
pub mod equity;
pub mod error;
pub mod event;
pub mod extractor;
pub mod metrics;
pub mod pipeline;
pub(crate) mod scanner;
pub mod trade;
