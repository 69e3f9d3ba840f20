//! End-to-end analysis of one log: decode, extract, correlate, fold, summarize.
//!
//! Every stage consumes the previous stage's complete output and returns
//! fresh immutable data, so independent logs can be analysed on separate
//! threads without coordination.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use super::correlation::{Correlator, DEFAULT_SIGNAL_LOOKBACK_SECS, PairingMode, SignalMatcher};
use super::decoder::{self, TextEncoding};
use super::equity::EquityCurve;
use super::event::{Event, EventKind};
use super::extractor::{self, ExtractionStats};
use super::metrics::{SignalStats, Summary};
use super::trade::Trade;

pub const DEFAULT_RISK_WARN_PCT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Overrides the deposit detected in the log when set.
    pub starting_balance: Option<f64>,
    pub signal_lookback_secs: i64,
    pub pairing: PairingMode,
    /// Single-trade losses at or above this share of the balance are flagged.
    pub risk_warn_pct: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            starting_balance: None,
            signal_lookback_secs: DEFAULT_SIGNAL_LOOKBACK_SECS,
            pairing: PairingMode::default(),
            risk_warn_pct: DEFAULT_RISK_WARN_PCT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSource {
    Configured,
    DetectedInLog,
    Default,
}

impl fmt::Display for BalanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BalanceSource::Configured => "configured",
            BalanceSource::DetectedInLog => "detected in log",
            BalanceSource::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub encoding: TextEncoding,
    pub lines_total: usize,
    pub lines_dropped: usize,
    pub lines_malformed: usize,
    pub events_by_kind: BTreeMap<EventKind, usize>,
    pub pairing: PairingMode,
    pub signal_lookback_secs: i64,
    pub tickets_from_deals: usize,
    pub unmatched_opens: usize,
    pub unmatched_closes: usize,
    pub ordering_anomalies: usize,
    pub trades_without_signal: usize,
    pub oversized_losses: usize,
}

impl Diagnostics {
    pub fn events(&self, kind: EventKind) -> usize {
        self.events_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub events: Vec<Event>,
    /// In pairing order.
    pub trades: Vec<Trade>,
    pub equity: EquityCurve,
    pub summary: Summary,
    pub signals: SignalStats,
    pub balance_source: BalanceSource,
    pub diagnostics: Diagnostics,
}

pub fn analyze_bytes(bytes: &[u8], config: &AnalysisConfig) -> Analysis {
    let decoded = decoder::decode(bytes);
    info!(
        encoding = %decoded.encoding,
        lines = decoded.lines.len(),
        "decoded log"
    );
    analyze_lines(&decoded.lines, decoded.encoding, config)
}

pub fn analyze_lines<S: AsRef<str>>(
    lines: &[S],
    encoding: TextEncoding,
    config: &AnalysisConfig,
) -> Analysis {
    let extraction = extractor::extract_events(lines);
    let ExtractionStats {
        lines_total,
        lines_dropped,
        lines_malformed,
        by_kind,
    } = extraction.stats;
    info!(
        events = extraction.events.len(),
        dropped = lines_dropped,
        malformed = lines_malformed,
        "extracted events"
    );

    let (starting_balance, balance_source) = resolve_balance(lines, config.starting_balance);

    let matcher = SignalMatcher::new(config.signal_lookback_secs);
    let correlation = Correlator::new(config.pairing, matcher).correlate(&extraction.events);
    let trades_without_signal = correlation
        .trades
        .iter()
        .filter(|t| t.signal.is_none())
        .count();
    info!(
        trades = correlation.trades.len(),
        pairing = %config.pairing,
        unmatched_opens = correlation.unmatched_opens,
        unmatched_closes = correlation.unmatched_closes,
        "correlated trades"
    );

    let equity = EquityCurve::build(&correlation.trades, starting_balance);
    let oversized = equity.oversized_losses(config.risk_warn_pct);
    for point in &oversized {
        warn!(
            close = %point.close_ts,
            loss_pct = point.relative_loss_pct.unwrap_or_default(),
            threshold = config.risk_warn_pct,
            "single loss exceeds risk threshold"
        );
    }
    let oversized_losses = oversized.len();

    let summary = Summary::compute(&correlation.trades, &equity);
    let signals = SignalStats::compute(&extraction.events, &correlation.trades);
    info!(
        starting_balance,
        balance_source = %balance_source,
        net_profit = summary.net_profit,
        max_drawdown = summary.max_drawdown_abs,
        "computed metrics"
    );

    Analysis {
        events: extraction.events,
        trades: correlation.trades,
        equity,
        summary,
        signals,
        balance_source,
        diagnostics: Diagnostics {
            encoding,
            lines_total,
            lines_dropped,
            lines_malformed,
            events_by_kind: by_kind,
            pairing: config.pairing,
            signal_lookback_secs: matcher.lookback_secs(),
            tickets_from_deals: correlation.tickets_from_deals,
            unmatched_opens: correlation.unmatched_opens,
            unmatched_closes: correlation.unmatched_closes,
            ordering_anomalies: correlation.ordering_anomalies,
            trades_without_signal,
            oversized_losses,
        },
    }
}

fn resolve_balance<S: AsRef<str>>(lines: &[S], configured: Option<f64>) -> (f64, BalanceSource) {
    if let Some(balance) = configured {
        return (balance, BalanceSource::Configured);
    }
    match extractor::detect_initial_deposit(lines) {
        Some(balance) => (balance, BalanceSource::DetectedInLog),
        None => (0.0, BalanceSource::Default),
    }
}
