//! Markdown report adapter implementing ReportPort.
//!
//! Sections: overview, performance, risk, exit management, the categorical
//! breakdown tables, signal/filter activity and parse diagnostics.

use std::fs;
use std::path::Path;

use crate::domain::equity::EquityCurve;
use crate::domain::error::TradelogError;
use crate::domain::metrics::{Breakdown, SignalStats, Summary};
use crate::domain::pipeline::{Analysis, Diagnostics};
use crate::domain::scanner::TIMESTAMP_FORMAT;
use crate::ports::report_port::ReportPort;

pub struct MarkdownReportAdapter {
    risk_warn_pct: f64,
}

impl MarkdownReportAdapter {
    pub fn new(risk_warn_pct: f64) -> Self {
        Self { risk_warn_pct }
    }

    pub fn render(&self, analysis: &Analysis, source: &Path) -> String {
        let summary = &analysis.summary;
        let mut output = String::new();

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        output.push_str(&format!("# Trade log analysis: {}\n\n", name));

        output.push_str(&render_overview(analysis));
        output.push_str(&render_performance(summary));
        output.push_str(&render_risk(summary, &analysis.equity, self.risk_warn_pct));
        output.push_str(&render_exit_management(summary));

        output.push_str(&render_breakdown("By close day", "Day", &summary.by_close_day));
        output.push_str(&render_breakdown("By open hour", "Hour", &summary.by_open_hour));
        output.push_str(&render_breakdown(
            "By signal strength",
            "Strength (abs)",
            &summary.by_strength,
        ));
        output.push_str(&render_breakdown("By confluence", "Confluence %", &summary.by_confluence));
        output.push_str(&render_breakdown("By close reason", "Reason", &summary.by_reason));
        output.push_str(&render_breakdown("By side", "Side", &summary.by_side));

        output.push_str(&render_signals(&analysis.signals));
        output.push_str(&render_diagnostics(&analysis.diagnostics));
        output
    }
}

impl Default for MarkdownReportAdapter {
    fn default() -> Self {
        Self::new(crate::domain::pipeline::DEFAULT_RISK_WARN_PCT)
    }
}

impl ReportPort for MarkdownReportAdapter {
    fn write(
        &self,
        analysis: &Analysis,
        source: &Path,
        output_path: &Path,
    ) -> Result<(), TradelogError> {
        fs::write(output_path, self.render(analysis, source)).map_err(|e| TradelogError::Report {
            path: output_path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn render_overview(analysis: &Analysis) -> String {
    let summary = &analysis.summary;
    let diagnostics = &analysis.diagnostics;
    let mut output = String::from("## Overview\n\n");
    output.push_str("| Item | Value |\n|---|---|\n");
    output.push_str(&format!("| Encoding | {} |\n", diagnostics.encoding));
    output.push_str(&format!(
        "| Starting balance | {:.2} ({}) |\n",
        summary.starting_balance, analysis.balance_source
    ));
    output.push_str(&format!("| Final balance | {:.2} |\n", summary.final_balance));
    output.push_str(&format!("| Pairing | {} |\n", diagnostics.pairing));
    output.push_str(&format!(
        "| Signal lookback | {} s |\n",
        diagnostics.signal_lookback_secs
    ));
    if let (Some(first), Some(last)) = (analysis.trades.first(), analysis.equity.points.last()) {
        output.push_str(&format!(
            "| Period | {} to {} |\n",
            first.open.ts.format(TIMESTAMP_FORMAT),
            last.close_ts.format(TIMESTAMP_FORMAT)
        ));
    }
    output.push('\n');
    output
}

fn render_performance(summary: &Summary) -> String {
    let mut output = String::from("## Performance\n\n");
    output.push_str("| Metric | Value |\n|---|---|\n");
    output.push_str(&format!("| Trades | {} |\n", summary.total_trades));
    output.push_str(&format!(
        "| Wins / losses / breakeven | {} / {} / {} |\n",
        summary.wins, summary.losses, summary.breakevens
    ));
    output.push_str(&format!("| Win rate | {:.1}% |\n", summary.win_rate));
    output.push_str(&format!(
        "| Tagged WIN / LOSS | {} / {} ({} disagree with profit sign) |\n",
        summary.tagged_wins, summary.tagged_losses, summary.label_mismatches
    ));
    output.push_str(&format!("| Gross profit | {:.2} |\n", summary.gross_profit));
    output.push_str(&format!("| Gross loss | {:.2} |\n", summary.gross_loss));
    output.push_str(&format!("| Net profit | {:+.2} |\n", summary.net_profit));
    output.push_str(&format!(
        "| Profit factor | {} |\n",
        format_ratio(summary.profit_factor)
    ));
    output.push_str(&format!("| Expectancy | {:+.2} |\n", summary.expectancy));
    output.push_str(&format!("| Profit std dev | {:.2} |\n", summary.profit_std_dev));
    output.push_str(&format!("| Average win | {:.2} |\n", summary.avg_win));
    output.push_str(&format!("| Average loss | {:.2} |\n", summary.avg_loss));
    output.push_str(&format!("| Largest win | {:.2} |\n", summary.largest_win));
    output.push_str(&format!("| Largest loss | {:.2} |\n", summary.largest_loss));
    output.push_str(&format!(
        "| Risk/reward | {} |\n",
        summary.risk_reward.map(format_ratio).unwrap_or_else(|| "n/a".into())
    ));
    output.push_str(&format!(
        "| Kelly fraction | {} |\n",
        summary
            .kelly_fraction
            .map(|k| format!("{:.1}%", k * 100.0))
            .unwrap_or_else(|| "n/a".into())
    ));
    output.push_str(&format!(
        "| Average duration | {:.1} min |\n",
        summary.avg_duration_minutes
    ));
    output.push('\n');
    output
}

fn render_risk(summary: &Summary, equity: &EquityCurve, risk_warn_pct: f64) -> String {
    let mut output = String::from("## Risk\n\n");
    output.push_str("| Metric | Value |\n|---|---|\n");
    output.push_str(&format!(
        "| Max drawdown | {:.2} ({:.2}%) |\n",
        summary.max_drawdown_abs, summary.max_drawdown_pct
    ));
    output.push_str(&format!(
        "| Longest winning streak | {} |\n",
        summary.max_consecutive_wins
    ));
    output.push_str(&format!(
        "| Longest losing streak | {} |\n",
        summary.max_consecutive_losses
    ));
    output.push_str(&format!(
        "| Longest stop-loss streak | {} |\n",
        summary.max_consecutive_stop_losses
    ));
    output.push_str(&format!(
        "| Worst single loss | {} |\n",
        summary
            .worst_relative_loss_pct
            .map(|p| format!("{:.2}% of balance", p))
            .unwrap_or_else(|| "n/a".into())
    ));
    output.push('\n');

    let oversized = equity.oversized_losses(risk_warn_pct);
    if !oversized.is_empty() {
        output.push_str(&format!(
            "Losses of at least {:.1}% of the balance:\n\n",
            risk_warn_pct
        ));
        for point in oversized {
            output.push_str(&format!(
                "- {}: {:.2} ({:.2}% of {:.2})\n",
                point.close_ts.format(TIMESTAMP_FORMAT),
                point.profit,
                point.relative_loss_pct.unwrap_or_default(),
                point.balance_before
            ));
        }
        output.push('\n');
    }
    output
}

fn render_exit_management(summary: &Summary) -> String {
    let mut output = String::from("## Exit management\n\n");
    output.push_str(&format!(
        "- Break-even activated on {} of {} trades\n",
        summary.break_even_trades, summary.total_trades
    ));
    output.push_str(&format!(
        "- Trailing stop engaged on {} of {} trades\n\n",
        summary.trailing_trades, summary.total_trades
    ));
    output
}

fn render_breakdown(title: &str, key_header: &str, rows: &[Breakdown]) -> String {
    let mut output = format!("## {}\n\n", title);
    if rows.is_empty() {
        output.push_str("_No trades._\n\n");
        return output;
    }
    output.push_str(&format!(
        "| {} | Trades | Wins | Win rate | P&L |\n|---|---:|---:|---:|---:|\n",
        escape_cell(key_header)
    ));
    for row in rows {
        output.push_str(&format!(
            "| {} | {} | {} | {:.1}% | {:+.2} |\n",
            escape_cell(&row.key),
            row.count,
            row.wins,
            row.win_rate,
            row.total_pnl
        ));
    }
    output.push('\n');
    output
}

fn render_signals(stats: &SignalStats) -> String {
    let mut output = String::from("## Signals and filters\n\n");
    output.push_str(&format!(
        "- Signals detected: {} ({} led to a trade)\n",
        stats.total_signals, stats.signals_traded
    ));
    output.push_str(&format!(
        "- Entry/strength direction conflicts: {}\n",
        stats.direction_conflicts
    ));
    output.push_str(&format!("- Filter blocks: {}", stats.filter_blocks));
    if let Some(ratio) = stats.blocks_per_trade {
        output.push_str(&format!(" ({:.1} per trade)", ratio));
    }
    output.push('\n');
    for (name, count) in &stats.blocks_by_filter {
        output.push_str(&format!("  - {}: {}\n", escape_cell(name), count));
    }
    output.push('\n');
    output
}

fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut output = String::from("## Diagnostics\n\n");
    output.push_str("| Counter | Value |\n|---|---:|\n");
    output.push_str(&format!("| Lines read | {} |\n", diagnostics.lines_total));
    output.push_str(&format!("| Lines dropped | {} |\n", diagnostics.lines_dropped));
    output.push_str(&format!(
        "| Lines with unparsable numbers | {} |\n",
        diagnostics.lines_malformed
    ));
    for (kind, count) in &diagnostics.events_by_kind {
        output.push_str(&format!("| Events: {} | {} |\n", kind, count));
    }
    output.push_str(&format!(
        "| Tickets from tester deals | {} |\n",
        diagnostics.tickets_from_deals
    ));
    output.push_str(&format!(
        "| Unmatched opens | {} |\n",
        diagnostics.unmatched_opens
    ));
    output.push_str(&format!(
        "| Unmatched closes | {} |\n",
        diagnostics.unmatched_closes
    ));
    output.push_str(&format!(
        "| Close-before-open pairings | {} |\n",
        diagnostics.ordering_anomalies
    ));
    output.push_str(&format!(
        "| Trades without signal | {} |\n",
        diagnostics.trades_without_signal
    ));
    output.push('\n');
    output
}

fn format_ratio(value: f64) -> String {
    if value.is_infinite() {
        "∞".to_string()
    } else {
        format!("{:.2}", value)
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
