//! Pairing of open/close events into trades, with signal attribution.
//!
//! How opens meet closes is a [`CorrelationStrategy`]; which signal explains
//! a trade is decided by a [`SignalMatcher`] with an explicit lookback.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, warn};

use super::deals;
use super::event::{Event, Signal, StopAction, StopAdjustment, TradeClose, TradeOpen};
use super::trade::{ExitManagement, Trade};

pub const DEFAULT_SIGNAL_LOOKBACK_SECS: i64 = 3600;

/// Largest window a `TimeDelta` can hold, in whole seconds.
pub const MAX_SIGNAL_LOOKBACK_SECS: i64 = i64::MAX / 1000;

/// Index pairs into the sorted open and close lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    pub pairs: Vec<(usize, usize)>,
    pub unmatched_opens: usize,
    pub unmatched_closes: usize,
}

pub trait CorrelationStrategy {
    fn name(&self) -> &'static str;

    /// `opens` and `closes` are each sorted by timestamp then line.
    fn pair(&self, opens: &[TradeOpen], closes: &[TradeClose]) -> Pairing;
}

/// The i-th open pairs with the i-th close. Assumes at most one position is
/// open at any time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalFifo;

impl CorrelationStrategy for PositionalFifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn pair(&self, opens: &[TradeOpen], closes: &[TradeClose]) -> Pairing {
        let n = opens.len().min(closes.len());
        Pairing {
            pairs: (0..n).map(|i| (i, i)).collect(),
            unmatched_opens: opens.len() - n,
            unmatched_closes: closes.len() - n,
        }
    }
}

/// Pairs an open with the earliest unused close carrying the same ticket.
/// Events without a ticket never pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketKeyed;

impl CorrelationStrategy for TicketKeyed {
    fn name(&self) -> &'static str {
        "ticket"
    }

    fn pair(&self, opens: &[TradeOpen], closes: &[TradeClose]) -> Pairing {
        let mut by_ticket: BTreeMap<u64, VecDeque<usize>> = BTreeMap::new();
        for (index, close) in closes.iter().enumerate() {
            if let Some(ticket) = close.ticket {
                by_ticket.entry(ticket).or_default().push_back(index);
            }
        }

        let mut pairs = Vec::new();
        for (open_index, open) in opens.iter().enumerate() {
            let close_index = open
                .ticket
                .and_then(|ticket| by_ticket.get_mut(&ticket))
                .and_then(VecDeque::pop_front);
            if let Some(close_index) = close_index {
                pairs.push((open_index, close_index));
            }
        }

        Pairing {
            unmatched_opens: opens.len() - pairs.len(),
            unmatched_closes: closes.len() - pairs.len(),
            pairs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairingMode {
    #[default]
    Positional,
    Ticket,
}

impl PairingMode {
    pub fn strategy(&self) -> Box<dyn CorrelationStrategy + Send + Sync> {
        match self {
            PairingMode::Positional => Box::new(PositionalFifo),
            PairingMode::Ticket => Box::new(TicketKeyed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PairingMode::Positional => "fifo",
            PairingMode::Ticket => "ticket",
        }
    }
}

impl FromStr for PairingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" | "positional" => Ok(PairingMode::Positional),
            "ticket" | "id" => Ok(PairingMode::Ticket),
            other => Err(format!(
                "unknown pairing mode '{other}' (expected fifo or ticket)"
            )),
        }
    }
}

impl fmt::Display for PairingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the latest signal at or before a trade's open, provided it falls
/// inside the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalMatcher {
    lookback: TimeDelta,
}

impl SignalMatcher {
    pub fn new(lookback_secs: i64) -> Self {
        Self {
            lookback: TimeDelta::try_seconds(lookback_secs.max(0)).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn lookback_secs(&self) -> i64 {
        self.lookback.num_seconds()
    }

    /// `signals` must be sorted by timestamp then line.
    pub fn find<'s>(&self, signals: &'s [Signal], at: NaiveDateTime) -> Option<&'s Signal> {
        let upto = signals.partition_point(|s| s.ts <= at);
        let latest = signals[..upto].last()?;
        (at - latest.ts <= self.lookback).then_some(latest)
    }
}

impl Default for SignalMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_LOOKBACK_SECS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    /// Open and close lines whose ticket came from a tester deal.
    pub tickets_from_deals: usize,
    /// In pairing order (by open time).
    pub trades: Vec<Trade>,
    pub unmatched_opens: usize,
    pub unmatched_closes: usize,
    pub ordering_anomalies: usize,
}

pub struct Correlator {
    strategy: Box<dyn CorrelationStrategy + Send + Sync>,
    matcher: SignalMatcher,
}

impl Correlator {
    pub fn new(mode: PairingMode, matcher: SignalMatcher) -> Self {
        Self {
            strategy: mode.strategy(),
            matcher,
        }
    }

    pub fn correlate(&self, events: &[Event]) -> Correlation {
        let mut signals = Vec::new();
        let mut opens = Vec::new();
        let mut closes = Vec::new();
        let mut adjustments = Vec::new();
        let mut fills = Vec::new();
        for event in events {
            match event {
                Event::Signal(s) => signals.push(s.clone()),
                Event::TradeOpen(o) => opens.push(o.clone()),
                Event::TradeClose(c) => closes.push(c.clone()),
                Event::StopAdjustment(a) => adjustments.push(a.clone()),
                Event::Deal(d) => fills.push(d.clone()),
                Event::FilterBlock(_) | Event::IndicatorReading(_) => {}
            }
        }
        signals.sort_by_key(|s| (s.ts, s.line));
        opens.sort_by_key(|o| (o.ts, o.line));
        closes.sort_by_key(|c| (c.ts, c.line));
        fills.sort_by_key(|d| (d.ts, d.line));

        let tickets_from_deals = deals::stamp_tickets(&mut opens, &mut closes, &fills);
        if tickets_from_deals > 0 {
            debug!(tickets_from_deals, deals = fills.len(), "tickets taken from tester deals");
        }

        let pairing = self.strategy.pair(&opens, &closes);
        if pairing.unmatched_opens > 0 || pairing.unmatched_closes > 0 {
            warn!(
                strategy = self.strategy.name(),
                unmatched_opens = pairing.unmatched_opens,
                unmatched_closes = pairing.unmatched_closes,
                "open/close counts do not balance"
            );
        }

        let mut ordering_anomalies = 0;
        let trades: Vec<Trade> = pairing
            .pairs
            .iter()
            .map(|&(oi, ci)| {
                let open = opens[oi].clone();
                let close = closes[ci].clone();
                let signal = self.matcher.find(&signals, open.ts).cloned();
                let trade = Trade::new(open, close, signal);
                if trade.is_ordering_anomaly() {
                    ordering_anomalies += 1;
                    warn!(
                        open_line = trade.open.line + 1,
                        close_line = trade.close.line + 1,
                        "trade closes before it opens"
                    );
                }
                let exits = exit_management(&trade, &adjustments);
                trade.with_exits(exits)
            })
            .collect();

        Correlation {
            trades,
            tickets_from_deals,
            unmatched_opens: pairing.unmatched_opens,
            unmatched_closes: pairing.unmatched_closes,
            ordering_anomalies,
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(PairingMode::default(), SignalMatcher::default())
    }
}

/// Stop activity belongs to a trade by ticket when its open has one,
/// otherwise by falling inside its open interval.
fn exit_management(trade: &Trade, adjustments: &[StopAdjustment]) -> ExitManagement {
    let ticket = trade.open.ticket;
    let belongs = |a: &&StopAdjustment| match ticket {
        Some(t) => a.ticket == t,
        None => a.ts >= trade.open.ts && a.ts <= trade.close.ts,
    };

    adjustments
        .iter()
        .filter(belongs)
        .fold(ExitManagement::default(), |mut exits, a| {
            match a.action {
                StopAction::BreakEven => exits.break_even = true,
                StopAction::TrailingStart => exits.trailing_started = true,
                StopAction::TrailingMove => {
                    exits.trailing_started = true;
                    exits.trailing_moves += 1;
                }
            }
            exits
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Deal, Outcome, Side};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn open(ts: NaiveDateTime, line: usize, ticket: Option<u64>) -> Event {
        Event::TradeOpen(TradeOpen {
            ts,
            line,
            side: Side::Buy,
            price: 100.0,
            volume: 1.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            ticket,
        })
    }

    fn close(ts: NaiveDateTime, line: usize, profit: f64, ticket: Option<u64>) -> Event {
        Event::TradeClose(TradeClose {
            ts,
            line,
            outcome: Outcome::from_profit(profit),
            outcome_inferred: false,
            profit,
            reason: "Take Profit".into(),
            ticket,
        })
    }

    fn signal(ts: NaiveDateTime, line: usize, strength: i32) -> Signal {
        Signal {
            ts,
            line,
            bar_index: 1,
            entry_direction: 1,
            strength,
            confluence_pct: 80.0,
        }
    }

    fn adjustment(ts: NaiveDateTime, action: StopAction, ticket: u64) -> Event {
        Event::StopAdjustment(StopAdjustment {
            ts,
            line: 99,
            action,
            side: Side::Buy,
            ticket,
            new_stop: None,
        })
    }

    #[test]
    fn fifo_pairs_by_position() {
        let events = vec![
            open(at(10, 0), 0, None),
            close(at(10, 30), 1, 5.0, None),
            open(at(11, 0), 2, None),
            close(at(11, 30), 3, -2.0, None),
        ];
        let result = Correlator::default().correlate(&events);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].open.line, 0);
        assert_eq!(result.trades[0].close.line, 1);
        assert_eq!(result.trades[1].open.line, 2);
        assert_eq!(result.trades[1].close.line, 3);
        assert_eq!(result.unmatched_opens, 0);
        assert_eq!(result.unmatched_closes, 0);
    }

    #[test]
    fn surplus_opens_are_counted() {
        let events = vec![
            open(at(10, 0), 0, None),
            close(at(10, 30), 1, 5.0, None),
            open(at(11, 0), 2, None),
            close(at(11, 30), 3, -2.0, None),
            open(at(12, 0), 4, None),
        ];
        let result = Correlator::default().correlate(&events);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.unmatched_opens, 1);
        assert_eq!(result.unmatched_closes, 0);
    }

    #[test]
    fn close_before_open_still_pairs() {
        let events = vec![close(at(9, 0), 0, 1.0, None), open(at(10, 0), 1, None)];
        let result = Correlator::default().correlate(&events);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.ordering_anomalies, 1);
        assert!(result.trades[0].duration_secs < 0);
    }

    #[test]
    fn ticket_pairing_matches_ids() {
        let events = vec![
            open(at(10, 0), 0, Some(1)),
            open(at(10, 5), 1, Some(2)),
            close(at(10, 20), 2, 3.0, Some(2)),
            close(at(10, 40), 3, -1.0, Some(1)),
            close(at(10, 50), 4, -1.0, None),
            open(at(11, 0), 5, None),
        ];
        let correlator = Correlator::new(PairingMode::Ticket, SignalMatcher::default());
        let result = correlator.correlate(&events);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].close.line, 3);
        assert_eq!(result.trades[1].close.line, 2);
        assert_eq!(result.unmatched_opens, 1);
        assert_eq!(result.unmatched_closes, 1);
    }

    fn deal(ts: NaiveDateTime, line: usize, order: u64, side: Side) -> Event {
        Event::Deal(Deal {
            ts,
            line,
            deal_id: order,
            order_id: Some(order),
            side,
            volume: 1.0,
            symbol: "USDJPY".into(),
            price: 100.0,
        })
    }

    #[test]
    fn ticket_pairing_from_tester_deals() {
        // Two overlapping buys; the advisor lines carry no ticket.
        let events = vec![
            deal(at(10, 0), 0, 2, Side::Buy),
            open(at(10, 0), 1, None),
            deal(at(10, 5), 2, 3, Side::Buy),
            open(at(10, 5), 3, None),
            adjustment(at(10, 10), StopAction::BreakEven, 3),
            deal(at(10, 20), 4, 4, Side::Sell),
            close(at(10, 20), 5, 3.0, None),
            deal(at(10, 40), 6, 5, Side::Sell),
            close(at(10, 40), 7, -1.0, None),
        ];
        let correlator = Correlator::new(PairingMode::Ticket, SignalMatcher::default());
        let result = correlator.correlate(&events);

        assert_eq!(result.tickets_from_deals, 4);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].open.ticket, Some(2));
        assert_eq!(result.trades[0].close.line, 5);
        assert_eq!(result.trades[1].open.ticket, Some(3));
        assert_eq!(result.trades[1].close.line, 7);
        assert!(result.trades[1].exits.break_even);
        assert!(!result.trades[0].exits.break_even);
    }

    #[test]
    fn signal_matcher_picks_latest_within_window() {
        let signals = vec![
            signal(at(8, 0), 0, 1),
            signal(at(9, 30), 1, 2),
            signal(at(9, 30), 2, 3),
            signal(at(10, 30), 3, 4),
        ];
        let matcher = SignalMatcher::default();
        let found = matcher.find(&signals, at(10, 0)).unwrap();
        assert_eq!(found.line, 2);

        let exact = matcher.find(&signals, at(10, 30)).unwrap();
        assert_eq!(exact.line, 3);
    }

    #[test]
    fn signal_matcher_respects_lookback() {
        let signals = vec![signal(at(8, 0), 0, 1)];
        assert!(SignalMatcher::new(3600).find(&signals, at(9, 0)).is_some());
        assert!(SignalMatcher::new(3600).find(&signals, at(9, 1)).is_none());
        assert!(SignalMatcher::new(0).find(&signals, at(8, 0)).is_some());
        assert!(SignalMatcher::default().find(&signals, at(7, 59)).is_none());
        assert!(SignalMatcher::default().find(&[], at(9, 0)).is_none());
    }

    #[test]
    fn signal_matcher_saturates_huge_lookback() {
        let signals = vec![signal(at(8, 0), 0, 1)];
        let widest = SignalMatcher::new(i64::MAX);
        assert_eq!(widest.lookback_secs(), MAX_SIGNAL_LOOKBACK_SECS);
        assert!(widest.find(&signals, at(23, 0)).is_some());
        assert_eq!(SignalMatcher::new(-5).lookback_secs(), 0);
    }

    #[test]
    fn stale_latest_signal_hides_older_ones() {
        let signals = vec![signal(at(6, 0), 0, 1), signal(at(7, 0), 1, 2)];
        assert!(SignalMatcher::new(3600).find(&signals, at(8, 30)).is_none());
    }

    #[test]
    fn trades_carry_signal_context() {
        let events = vec![
            Event::Signal(signal(at(9, 55), 0, -4)),
            open(at(10, 0), 1, None),
            close(at(10, 30), 2, 5.0, None),
            open(at(13, 0), 3, None),
            close(at(13, 30), 4, 5.0, None),
        ];
        let result = Correlator::default().correlate(&events);
        assert_eq!(result.trades[0].signal.as_ref().map(|s| s.strength), Some(-4));
        assert!(result.trades[1].signal.is_none());
    }

    #[test]
    fn exit_management_by_window_and_ticket() {
        let events = vec![
            open(at(10, 0), 0, None),
            adjustment(at(10, 10), StopAction::BreakEven, 77),
            adjustment(at(10, 15), StopAction::TrailingMove, 77),
            adjustment(at(10, 20), StopAction::TrailingMove, 77),
            close(at(10, 30), 1, 5.0, None),
            open(at(11, 0), 2, None),
            close(at(11, 30), 3, 5.0, None),
        ];
        let result = Correlator::default().correlate(&events);
        let first = result.trades[0].exits;
        assert!(first.break_even);
        assert!(first.trailing_started);
        assert_eq!(first.trailing_moves, 2);
        assert_eq!(result.trades[1].exits, ExitManagement::default());

        let keyed = vec![
            open(at(10, 0), 0, Some(5)),
            adjustment(at(12, 0), StopAction::BreakEven, 5),
            adjustment(at(10, 5), StopAction::BreakEven, 6),
            close(at(10, 30), 1, 5.0, Some(5)),
        ];
        let result =
            Correlator::new(PairingMode::Ticket, SignalMatcher::default()).correlate(&keyed);
        assert!(result.trades[0].exits.break_even);
        assert_eq!(result.trades[0].exits.trailing_moves, 0);
    }

    #[test]
    fn pairing_mode_parsing() {
        assert_eq!("fifo".parse::<PairingMode>().unwrap(), PairingMode::Positional);
        assert_eq!("Positional".parse::<PairingMode>().unwrap(), PairingMode::Positional);
        assert_eq!(" ticket ".parse::<PairingMode>().unwrap(), PairingMode::Ticket);
        assert!("lifo".parse::<PairingMode>().is_err());
        assert_eq!(PairingMode::Ticket.to_string(), "ticket");
        assert_eq!(PairingMode::Ticket.strategy().name(), "ticket");
    }
}
