//! Log source port trait.

use std::path::Path;

use crate::domain::error::TradelogError;

/// Supplies the raw bytes of a strategy tester log.
///
/// An unreadable source is the one fatal condition of an analysis run and
/// must be reported as [`TradelogError::LogUnreadable`].
pub trait LogPort {
    fn read_log(&self, path: &Path) -> Result<Vec<u8>, TradelogError>;
}
