//! Typed events recognised in a strategy tester log.
//!
//! Every event records the timestamp found on its line and the zero-based
//! line index, which breaks ties between events sharing a timestamp.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }

    /// The tester's own lowercase spelling.
    pub fn parse_lowercase(token: &str) -> Option<Self> {
        match token {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tag written by the expert advisor on a close line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "WIN" => Some(Outcome::Win),
            "LOSS" => Some(Outcome::Loss),
            _ => None,
        }
    }

    pub fn from_profit(profit: f64) -> Self {
        if profit > 0.0 { Outcome::Win } else { Outcome::Loss }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub bar_index: i64,
    /// -1 sell, 0 none, 1 buy.
    pub entry_direction: i8,
    pub strength: i32,
    pub confluence_pct: f64,
}

impl Signal {
    /// Entry direction and strength sign point opposite ways.
    pub fn is_direction_conflict(&self) -> bool {
        (self.entry_direction > 0 && self.strength < 0)
            || (self.entry_direction < 0 && self.strength > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeOpen {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub side: Side,
    pub price: f64,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub ticket: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeClose {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub outcome: Outcome,
    /// Set when the line carried no WIN/LOSS tag and the outcome was taken
    /// from the profit sign.
    pub outcome_inferred: bool,
    pub profit: f64,
    pub reason: String,
    pub ticket: Option<u64>,
}

/// A fill reported by the tester itself rather than the advisor.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub deal_id: u64,
    /// The order the deal executed, from `(based on order #N)`.
    pub order_id: Option<u64>,
    pub side: Side,
    pub volume: f64,
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterBlock {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub filter_name: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopAction {
    BreakEven,
    TrailingStart,
    TrailingMove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopAdjustment {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub action: StopAction,
    pub side: Side,
    pub ticket: u64,
    pub new_stop: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorReading {
    pub ts: NaiveDateTime,
    pub line: usize,
    pub name: String,
    pub fields: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Signal,
    TradeOpen,
    TradeClose,
    Deal,
    FilterBlock,
    StopAdjustment,
    IndicatorReading,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Signal,
        EventKind::TradeOpen,
        EventKind::TradeClose,
        EventKind::Deal,
        EventKind::FilterBlock,
        EventKind::StopAdjustment,
        EventKind::IndicatorReading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Signal => "signal",
            EventKind::TradeOpen => "trade_open",
            EventKind::TradeClose => "trade_close",
            EventKind::Deal => "deal",
            EventKind::FilterBlock => "filter_block",
            EventKind::StopAdjustment => "stop_adjustment",
            EventKind::IndicatorReading => "indicator_reading",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Signal(Signal),
    TradeOpen(TradeOpen),
    TradeClose(TradeClose),
    Deal(Deal),
    FilterBlock(FilterBlock),
    StopAdjustment(StopAdjustment),
    IndicatorReading(IndicatorReading),
}

impl Event {
    pub fn ts(&self) -> NaiveDateTime {
        match self {
            Event::Signal(e) => e.ts,
            Event::TradeOpen(e) => e.ts,
            Event::TradeClose(e) => e.ts,
            Event::Deal(e) => e.ts,
            Event::FilterBlock(e) => e.ts,
            Event::StopAdjustment(e) => e.ts,
            Event::IndicatorReading(e) => e.ts,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Event::Signal(e) => e.line,
            Event::TradeOpen(e) => e.line,
            Event::TradeClose(e) => e.line,
            Event::Deal(e) => e.line,
            Event::FilterBlock(e) => e.line,
            Event::StopAdjustment(e) => e.line,
            Event::IndicatorReading(e) => e.line,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Signal(_) => EventKind::Signal,
            Event::TradeOpen(_) => EventKind::TradeOpen,
            Event::TradeClose(_) => EventKind::TradeClose,
            Event::Deal(_) => EventKind::Deal,
            Event::FilterBlock(_) => EventKind::FilterBlock,
            Event::StopAdjustment(_) => EventKind::StopAdjustment,
            Event::IndicatorReading(_) => EventKind::IndicatorReading,
        }
    }

    /// Total order key: timestamp, then input line.
    pub fn order_key(&self) -> (NaiveDateTime, usize) {
        (self.ts(), self.line())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{:<6} ", self.ts().format("%Y.%m.%d %H:%M:%S"), self.line() + 1)?;
        match self {
            Event::Signal(s) => write!(
                f,
                "SIGNAL bar={} entry={} strength={} confluence={:.1}%",
                s.bar_index, s.entry_direction, s.strength, s.confluence_pct
            ),
            Event::TradeOpen(o) => write!(
                f,
                "OPEN   {} @ {} vol={} sl={} tp={}",
                o.side, o.price, o.volume, o.stop_loss, o.take_profit
            ),
            Event::TradeClose(c) => {
                write!(f, "CLOSE  {} profit={:.2} reason={}", c.outcome, c.profit, c.reason)
            }
            Event::Deal(d) => write!(
                f,
                "DEAL   #{} {} {} {} @ {}",
                d.deal_id, d.side, d.volume, d.symbol, d.price
            ),
            Event::FilterBlock(b) => write!(f, "BLOCK  {}: {}", b.filter_name, b.detail),
            Event::StopAdjustment(a) => write!(f, "STOP   {:?} {} #{}", a.action, a.side, a.ticket),
            Event::IndicatorReading(r) => {
                write!(f, "IND    {}", r.name)?;
                for (key, value) in &r.fields {
                    write!(f, " {}={}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn signal(entry: i8, strength: i32) -> Signal {
        Signal {
            ts: at(10, 0),
            line: 3,
            bar_index: 1,
            entry_direction: entry,
            strength,
            confluence_pct: 75.0,
        }
    }

    #[test]
    fn side_and_outcome_tokens() {
        assert_eq!(Side::parse("BUY"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("buy"), None);
        assert_eq!(Side::parse_lowercase("sell"), Some(Side::Sell));
        assert_eq!(Side::parse_lowercase("SELL"), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Outcome::parse("WIN"), Some(Outcome::Win));
        assert_eq!(Outcome::parse("LOSS"), Some(Outcome::Loss));
        assert_eq!(Outcome::parse("DRAW"), None);
    }

    #[test]
    fn outcome_from_profit_sign() {
        assert_eq!(Outcome::from_profit(0.01), Outcome::Win);
        assert_eq!(Outcome::from_profit(0.0), Outcome::Loss);
        assert_eq!(Outcome::from_profit(-3.0), Outcome::Loss);
    }

    #[test]
    fn direction_conflict() {
        assert!(signal(1, -3).is_direction_conflict());
        assert!(signal(-1, 2).is_direction_conflict());
        assert!(!signal(1, 3).is_direction_conflict());
        assert!(!signal(0, -3).is_direction_conflict());
    }

    #[test]
    fn event_accessors() {
        let event = Event::Signal(signal(1, 3));
        assert_eq!(event.ts(), at(10, 0));
        assert_eq!(event.line(), 3);
        assert_eq!(event.kind(), EventKind::Signal);
        assert_eq!(event.order_key(), (at(10, 0), 3));
    }

    #[test]
    fn event_display_is_one_line() {
        let event = Event::FilterBlock(FilterBlock {
            ts: at(9, 30),
            line: 0,
            filter_name: "RSIOMA".into(),
            detail: "RSIOMA: BUY bloqueado".into(),
        });
        let text = event.to_string();
        assert!(text.starts_with("2023.01.04 09:30:00"));
        assert!(text.contains("BLOCK  RSIOMA: RSIOMA: BUY bloqueado"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn kinds_are_ordered_by_priority() {
        let mut kinds = EventKind::ALL.to_vec();
        kinds.sort();
        assert_eq!(kinds, EventKind::ALL.to_vec());
        assert_eq!(EventKind::TradeClose.to_string(), "trade_close");
    }
}
