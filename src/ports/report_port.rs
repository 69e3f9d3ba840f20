//! Report generation port trait.

use std::path::Path;

use crate::domain::error::TradelogError;
use crate::domain::pipeline::Analysis;

/// Port for writing analysis results. Renderers only format what the
/// pipeline computed; they never derive new analytics.
pub trait ReportPort {
    fn write(
        &self,
        analysis: &Analysis,
        source: &Path,
        output_path: &Path,
    ) -> Result<(), TradelogError>;
}
