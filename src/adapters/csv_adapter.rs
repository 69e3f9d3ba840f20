//! Per-trade CSV export.

use std::path::Path;

use crate::domain::error::TradelogError;
use crate::domain::pipeline::Analysis;
use crate::domain::scanner::TIMESTAMP_FORMAT;
use crate::domain::trade::Trade;
use crate::ports::report_port::ReportPort;

const HEADER: [&str; 17] = [
    "open_ts",
    "close_ts",
    "side",
    "ticket",
    "volume",
    "open_price",
    "sl",
    "tp",
    "profit",
    "outcome",
    "reason",
    "duration_min",
    "strength",
    "confluence_pct",
    "entry",
    "break_even",
    "trailing_moves",
];

/// Writes one row per reconstructed trade, in pairing order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTradeAdapter;

impl CsvTradeAdapter {
    pub fn write_to<W: std::io::Write>(&self, trades: &[Trade], out: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(HEADER)?;
        for trade in trades {
            writer.write_record(record(trade))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvTradeAdapter {
    fn write(
        &self,
        analysis: &Analysis,
        _source: &Path,
        output_path: &Path,
    ) -> Result<(), TradelogError> {
        let report_err = |reason: String| TradelogError::Report {
            path: output_path.to_path_buf(),
            reason,
        };
        let file = std::fs::File::create(output_path).map_err(|e| report_err(e.to_string()))?;
        self.write_to(&analysis.trades, file)
            .map_err(|e| report_err(e.to_string()))
    }
}

fn record(trade: &Trade) -> Vec<String> {
    let signal = trade.signal.as_ref();
    vec![
        trade.open.ts.format(TIMESTAMP_FORMAT).to_string(),
        trade.close.ts.format(TIMESTAMP_FORMAT).to_string(),
        trade.open.side.to_string(),
        trade.ticket().map(|t| t.to_string()).unwrap_or_default(),
        trade.open.volume.to_string(),
        trade.open.price.to_string(),
        trade.open.stop_loss.to_string(),
        trade.open.take_profit.to_string(),
        format!("{:.2}", trade.profit),
        trade.outcome.to_string(),
        trade.close.reason.clone(),
        format!("{:.1}", trade.duration_minutes()),
        signal.map(|s| s.strength.to_string()).unwrap_or_default(),
        signal.map(|s| s.confluence_pct.to_string()).unwrap_or_default(),
        signal.map(|s| s.entry_direction.to_string()).unwrap_or_default(),
        trade.exits.break_even.to_string(),
        trade.exits.trailing_moves.to_string(),
    ]
}
