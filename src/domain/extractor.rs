//! Line classification into typed events.
//!
//! All grammars live in one ordered table. Each line is tried against the
//! rows in priority order and the first row that parses wins; lines that no
//! row accepts are dropped and counted.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use super::event::{
    Deal, Event, EventKind, FilterBlock, IndicatorReading, Outcome, Side, Signal, StopAction,
    StopAdjustment, TradeClose, TradeOpen,
};
use super::scanner::{Mismatch, Scan, Scanner, find_timestamp};

type GrammarFn = fn(&mut Scanner<'_>, NaiveDateTime, usize) -> Scan<Event>;

struct Grammar {
    kind: EventKind,
    parse: GrammarFn,
}

/// Evaluated top to bottom. A kind may own several rows for variant
/// spellings of the same event.
const GRAMMARS: &[Grammar] = &[
    Grammar { kind: EventKind::Signal, parse: parse_signal },
    Grammar { kind: EventKind::TradeOpen, parse: parse_trade_open },
    Grammar { kind: EventKind::TradeClose, parse: parse_trade_close },
    Grammar { kind: EventKind::TradeClose, parse: parse_position_closed },
    Grammar { kind: EventKind::Deal, parse: parse_deal },
    Grammar { kind: EventKind::FilterBlock, parse: parse_filter_block },
    Grammar { kind: EventKind::StopAdjustment, parse: parse_break_even },
    Grammar { kind: EventKind::StopAdjustment, parse: parse_trailing },
    Grammar { kind: EventKind::IndicatorReading, parse: parse_indicator },
];

const REASON_LABELS: &[&str] = &["Razão:", "Razao:", "RazÃ£o:"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub lines_total: usize,
    pub lines_dropped: usize,
    /// Subset of dropped lines where a grammar matched structurally but a
    /// numeric field failed to parse.
    pub lines_malformed: usize,
    pub by_kind: BTreeMap<EventKind, usize>,
}

impl ExtractionStats {
    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Ordered by timestamp, ties broken by line index.
    pub events: Vec<Event>,
    pub stats: ExtractionStats,
}

/// Classifies a single line. `line` is the zero-based input index.
pub fn classify_line(text: &str, line: usize) -> Scan<Event> {
    let (ts, body_start) = find_timestamp(text).ok_or(Mismatch::Structure)?;
    let body = &text[body_start..];

    let mut first_numeric = None;
    for grammar in GRAMMARS {
        let mut scanner = Scanner::new(body);
        match (grammar.parse)(&mut scanner, ts, line) {
            Ok(event) => {
                debug_assert_eq!(event.kind(), grammar.kind);
                return Ok(event);
            }
            Err(Mismatch::Numeric(field)) => {
                first_numeric.get_or_insert(Mismatch::Numeric(field));
            }
            Err(Mismatch::Structure) => {}
        }
    }
    Err(first_numeric.unwrap_or(Mismatch::Structure))
}

/// Runs every line through the grammar table.
///
/// Accepts any line iterator so callers may stream; the result is the same
/// as for the collected batch.
pub fn extract_events<I, S>(lines: I) -> Extraction
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut events = Vec::new();
    let mut stats = ExtractionStats::default();

    for (index, text) in lines.into_iter().enumerate() {
        stats.lines_total += 1;
        match classify_line(text.as_ref(), index) {
            Ok(event) => {
                *stats.by_kind.entry(event.kind()).or_insert(0) += 1;
                events.push(event);
            }
            Err(Mismatch::Numeric(field)) => {
                stats.lines_dropped += 1;
                stats.lines_malformed += 1;
                debug!(line = index + 1, field, "dropping line with unparsable field");
            }
            Err(Mismatch::Structure) => stats.lines_dropped += 1,
        }
    }

    events.sort_by_key(Event::order_key);

    Extraction { events, stats }
}

/// Looks for the tester's starting deposit.
///
/// Prefers an `initial deposit <n>` line anywhere in the log and falls back
/// to the advisor's own `Saldo inicial: <n>` within the first 2000 lines.
pub fn detect_initial_deposit<S: AsRef<str>>(lines: &[S]) -> Option<f64> {
    const MARKER: &str = "initial deposit";
    const FALLBACK_WINDOW: usize = 2000;

    let from_tester = lines.iter().find_map(|line| {
        let line = line.as_ref();
        let lower = line.to_ascii_lowercase();
        let offset = lower.find(MARKER)?;
        let mut scanner = Scanner::new(&line[offset + MARKER.len()..]);
        scanner.float("initial deposit").ok()
    });
    if from_tester.is_some() {
        return from_tester;
    }

    lines.iter().take(FALLBACK_WINDOW).find_map(|line| {
        let mut scanner = Scanner::new(line.as_ref());
        scanner.seek("Saldo inicial:").ok()?;
        scanner.float("saldo inicial").ok()
    })
}

// `... Sinal detectado! Bar=<int>, Entry=<int>, Strength=<int>, Confluence=<float>%`
fn parse_signal(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("Sinal detectado!")?;
    s.seek("Bar=")?;
    let bar_index = s.integer("bar")?;
    s.expect(",")?;
    s.expect("Entry=")?;
    let entry = s.integer("entry")?;
    s.expect(",")?;
    s.expect("Strength=")?;
    let strength = s.integer("strength")?;
    s.expect(",")?;
    s.expect("Confluence=")?;
    let confluence_pct = s.float("confluence")?;
    s.expect("%")?;

    let entry_direction = match entry {
        -1 => -1,
        0 => 0,
        1 => 1,
        _ => return Err(Mismatch::Numeric("entry")),
    };
    let strength = i32::try_from(strength).map_err(|_| Mismatch::Numeric("strength"))?;

    Ok(Event::Signal(Signal {
        ts,
        line,
        bar_index,
        entry_direction,
        strength,
        confluence_pct,
    }))
}

// `... TRADE: <BUY|SELL> [#ticket] @ <f> | Vol: <f> | SL: <f> | TP: <f>`
fn parse_trade_open(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("TRADE:")?;
    let side = Side::parse(s.word()?).ok_or(Mismatch::Structure)?;
    let ticket = s.ticket()?;
    s.expect("@")?;
    let price = s.float("price")?;
    s.expect("|")?;
    s.expect("Vol:")?;
    let volume = s.float("volume")?;
    s.expect("|")?;
    s.expect("SL:")?;
    let stop_loss = s.float("stop loss")?;
    s.expect("|")?;
    s.expect("TP:")?;
    let take_profit = s.float("take profit")?;

    Ok(Event::TradeOpen(TradeOpen {
        ts,
        line,
        side,
        price,
        volume,
        stop_loss,
        take_profit,
        ticket,
    }))
}

// `... TRADE CLOSED: <WIN|LOSS> [#ticket] | Profit: <f> | Razão: <text>`
fn parse_trade_close(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("TRADE CLOSED:")?;
    let outcome = Outcome::parse(s.word()?).ok_or(Mismatch::Structure)?;
    let ticket = s.ticket()?;
    s.expect("|")?;
    s.expect("Profit:")?;
    let profit = s.float("profit")?;
    s.expect("|")?;
    s.expect_any(REASON_LABELS)?;
    let reason = s.rest().to_string();

    Ok(Event::TradeClose(TradeClose {
        ts,
        line,
        outcome,
        outcome_inferred: false,
        profit,
        reason,
        ticket,
    }))
}

// `... Posição fechada - Lucro: <f> | Razão: <text>` (no outcome tag)
fn parse_position_closed(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("fechada")?;
    s.expect("-")?;
    s.expect("Lucro:")?;
    let profit = s.float("profit")?;
    s.expect("|")?;
    s.expect_any(REASON_LABELS)?;
    let reason = s.rest().to_string();

    Ok(Event::TradeClose(TradeClose {
        ts,
        line,
        outcome: Outcome::from_profit(profit),
        outcome_inferred: true,
        profit,
        reason,
        ticket: None,
    }))
}

// `... deal #<n> <buy|sell> <vol> <SYMBOL> at <f> done (based on order #<n>)`
fn parse_deal(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("deal")?;
    let deal_id = s.ticket()?.ok_or(Mismatch::Structure)?;
    let side = Side::parse_lowercase(s.word()?).ok_or(Mismatch::Structure)?;
    let volume = s.float("volume")?;
    let symbol = s.token()?;
    s.expect("at")?;
    let price = s.float("price")?;
    let order_id = match s.seek("order") {
        Ok(()) => s.ticket()?,
        Err(_) => None,
    };

    Ok(Event::Deal(Deal {
        ts,
        line,
        deal_id,
        order_id,
        side,
        volume,
        symbol: symbol.to_string(),
        price,
    }))
}

// `... FILTRO BLOQUEOU: <text>`
fn parse_filter_block(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("FILTRO BLOQUEOU:")?;
    let detail = s.rest();
    if detail.is_empty() {
        return Err(Mismatch::Structure);
    }
    let filter_name = detail.split(':').next().unwrap_or(detail).trim();

    Ok(Event::FilterBlock(FilterBlock {
        ts,
        line,
        filter_name: filter_name.to_string(),
        detail: detail.to_string(),
    }))
}

// `... Break Even ATIVADO para <BUY|SELL> #<n>`
fn parse_break_even(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("Break Even ATIVADO para")?;
    let side = Side::parse(s.word()?).ok_or(Mismatch::Structure)?;
    let ticket = s.ticket()?.ok_or(Mismatch::Structure)?;

    Ok(Event::StopAdjustment(StopAdjustment {
        ts,
        line,
        action: StopAction::BreakEven,
        side,
        ticket,
        new_stop: None,
    }))
}

// `... Trailing INICIADO para <BUY|SELL> #<n>` or
// `... Trailing MOVEU <BUY|SELL> #<n> | Novo SL: <f>`
fn parse_trailing(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    s.seek("Trailing")?;
    let action = if s.consume("INICIADO para") {
        StopAction::TrailingStart
    } else if s.consume("MOVEU") {
        StopAction::TrailingMove
    } else {
        return Err(Mismatch::Structure);
    };
    let side = Side::parse(s.word()?).ok_or(Mismatch::Structure)?;
    let ticket = s.ticket()?.ok_or(Mismatch::Structure)?;

    let new_stop = if action == StopAction::TrailingMove {
        s.seek("Novo SL:")?;
        Some(s.float("new stop")?)
    } else {
        None
    };

    Ok(Event::StopAdjustment(StopAdjustment {
        ts,
        line,
        action,
        side,
        ticket,
        new_stop,
    }))
}

// `... [<NAME> DEBUG] Key=<f> | Label: Key=<f> ...`
fn parse_indicator(s: &mut Scanner<'_>, ts: NaiveDateTime, line: usize) -> Scan<Event> {
    const TAG: &str = " DEBUG]";

    let body = s.rest();
    let tag_at = body.find(TAG).ok_or(Mismatch::Structure)?;
    let open = body[..tag_at].rfind('[').ok_or(Mismatch::Structure)?;
    let name = body[open + 1..tag_at].trim();
    if name.is_empty() {
        return Err(Mismatch::Structure);
    }

    let mut fields = BTreeMap::new();
    for segment in body[tag_at + TAG.len()..].split('|') {
        collect_segment_fields(segment, &mut fields)?;
    }
    if fields.is_empty() {
        return Err(Mismatch::Structure);
    }

    Ok(Event::IndicatorReading(IndicatorReading {
        ts,
        line,
        name: name.to_string(),
        fields,
    }))
}

/// Reads `Key=value` pairs from one `|`-separated segment. A `Label:` before
/// the first pair qualifies the segment's keys as `Label.Key`.
fn collect_segment_fields(segment: &str, fields: &mut BTreeMap<String, f64>) -> Scan<()> {
    let segment = segment.trim();
    let (label, pairs) = match (segment.find(':'), segment.find('=')) {
        (Some(colon), Some(eq)) if colon < eq => {
            (Some(segment[..colon].trim()), &segment[colon + 1..])
        }
        _ => (None, segment),
    };

    for token in pairs.split([' ', ',', ';', '\t']) {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !looks_numeric(value) {
            continue;
        }
        let mut scanner = Scanner::new(value);
        let number = scanner.float("indicator field")?;
        let key = match label {
            Some(label) if !label.is_empty() => format!("{label}.{key}"),
            _ => key.to_string(),
        };
        fields.insert(key, number);
    }
    Ok(())
}

fn looks_numeric(value: &str) -> bool {
    let mut chars = value.trim_start().chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') | Some('+') | Some('.') => {
            chars.next().is_some_and(|c| c.is_ascii_digit() || c == '.')
        }
        _ => false,
    }
}
