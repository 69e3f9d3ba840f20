//! Summary statistics and categorical breakdowns over reconstructed trades.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Timelike};

use super::equity::EquityCurve;
use super::event::{Event, Outcome, Side};
use super::trade::Trade;

/// One row of a categorical breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    pub key: String,
    pub count: usize,
    pub wins: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_trades: usize,
    /// Counted by profit sign.
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    pub win_rate: f64,
    /// Counted by the WIN/LOSS tag on the close line.
    pub tagged_wins: usize,
    pub tagged_losses: usize,
    pub label_mismatches: usize,

    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub profit_std_dev: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// `None` when there are no losses to divide by.
    pub risk_reward: Option<f64>,
    pub kelly_fraction: Option<f64>,
    pub avg_duration_minutes: f64,

    pub starting_balance: f64,
    pub final_balance: f64,
    pub max_drawdown_abs: f64,
    pub max_drawdown_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub max_consecutive_stop_losses: usize,
    pub worst_relative_loss_pct: Option<f64>,

    pub break_even_trades: usize,
    pub trailing_trades: usize,

    pub by_close_day: Vec<Breakdown>,
    pub by_open_hour: Vec<Breakdown>,
    pub by_strength: Vec<Breakdown>,
    pub by_confluence: Vec<Breakdown>,
    pub by_reason: Vec<Breakdown>,
    pub by_side: Vec<Breakdown>,
}

impl Summary {
    pub fn compute(trades: &[Trade], curve: &EquityCurve) -> Self {
        let total_trades = trades.len();

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut breakevens = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_duration_secs = 0i64;

        for trade in trades {
            let pnl = trade.profit;
            if pnl > 0.0 {
                wins += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losses += 1;
                gross_loss += -pnl;
                largest_loss = largest_loss.max(-pnl);
            } else {
                breakevens += 1;
            }
            total_duration_secs += trade.duration_secs;
        }

        let tagged_wins = trades
            .iter()
            .filter(|t| t.outcome == Outcome::Win)
            .count();
        let label_mismatches = trades.iter().filter(|t| t.is_label_mismatch()).count();

        let win_rate = percentage(wins, total_trades);
        let net_profit = gross_profit - gross_loss;

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            f64::INFINITY
        };

        let expectancy = mean(trades.iter().map(|t| t.profit));
        let profit_std_dev = population_std_dev(trades.iter().map(|t| t.profit));

        let avg_win = if wins > 0 {
            gross_profit / wins as f64
        } else {
            0.0
        };
        let avg_loss = if losses > 0 {
            gross_loss / losses as f64
        } else {
            0.0
        };

        let risk_reward = (avg_loss > 0.0).then(|| avg_win / avg_loss);
        let kelly_fraction = risk_reward
            .filter(|rr| *rr > 0.0)
            .map(|rr| kelly(win_rate / 100.0, rr));

        let avg_duration_minutes = if total_trades > 0 {
            total_duration_secs as f64 / 60.0 / total_trades as f64
        } else {
            0.0
        };

        Summary {
            total_trades,
            wins,
            losses,
            breakevens,
            win_rate,
            tagged_wins,
            tagged_losses: total_trades - tagged_wins,
            label_mismatches,
            gross_profit,
            gross_loss,
            net_profit,
            profit_factor,
            expectancy,
            profit_std_dev,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            risk_reward,
            kelly_fraction,
            avg_duration_minutes,
            starting_balance: curve.starting_balance,
            final_balance: curve.final_balance(),
            max_drawdown_abs: curve.max_drawdown_abs(),
            max_drawdown_pct: curve.max_drawdown_pct(),
            max_consecutive_wins: curve.max_consecutive_wins,
            max_consecutive_losses: curve.max_consecutive_losses,
            max_consecutive_stop_losses: curve.max_consecutive_stop_losses,
            worst_relative_loss_pct: curve.worst_relative_loss_pct(),
            break_even_trades: trades.iter().filter(|t| t.exits.break_even).count(),
            trailing_trades: trades.iter().filter(|t| t.exits.trailing_started).count(),
            by_close_day: group_by(
                trades,
                |t| Some(t.close.ts.date()),
                |d: &NaiveDate| d.format("%Y-%m-%d").to_string(),
            ),
            by_open_hour: group_by(
                trades,
                |t| Some(t.open.ts.hour()),
                |h: &u32| format!("{h:02}:00"),
            ),
            by_strength: group_by(
                trades,
                |t| t.signal.as_ref().map(|s| s.strength.unsigned_abs()),
                |s: &u32| s.to_string(),
            ),
            by_confluence: group_by(
                trades,
                |t| t.signal.as_ref().map(|s| confluence_bucket(s.confluence_pct)),
                |b: &usize| CONFLUENCE_LABELS[*b].to_string(),
            ),
            by_reason: by_reason(trades),
            by_side: group_by(trades, |t| Some(t.open.side), |s: &Side| s.to_string()),
        }
    }
}

/// Kelly criterion `(p * b - q) / b` for win probability `p` and payoff ratio `b`.
pub fn kelly(win_probability: f64, risk_reward: f64) -> f64 {
    (win_probability * risk_reward - (1.0 - win_probability)) / risk_reward
}

const CONFLUENCE_LABELS: [&str; 4] = ["<50", "50-75", "75-90", "90-100"];

/// Right-inclusive buckets: (..50], (50, 75], (75, 90], (90, ..).
pub fn confluence_bucket(pct: f64) -> usize {
    if pct <= 50.0 {
        0
    } else if pct <= 75.0 {
        1
    } else if pct <= 90.0 {
        2
    } else {
        3
    }
}

pub fn confluence_label(pct: f64) -> &'static str {
    CONFLUENCE_LABELS[confluence_bucket(pct)]
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n > 0 { sum / n as f64 } else { 0.0 }
}

fn population_std_dev<I: Iterator<Item = f64> + Clone>(values: I) -> f64 {
    let n = values.clone().count();
    if n == 0 {
        return 0.0;
    }
    let avg = mean(values.clone());
    let variance = values.map(|v| (v - avg).powi(2)).sum::<f64>() / n as f64;
    variance.sqrt()
}

#[derive(Default)]
struct Tally {
    count: usize,
    wins: usize,
    total_pnl: f64,
}

impl Tally {
    fn add(&mut self, trade: &Trade) {
        self.count += 1;
        self.total_pnl += trade.profit;
        if trade.is_win() {
            self.wins += 1;
        }
    }

    fn into_breakdown(self, key: String) -> Breakdown {
        Breakdown {
            win_rate: percentage(self.wins, self.count),
            key,
            count: self.count,
            wins: self.wins,
            total_pnl: self.total_pnl,
        }
    }
}

/// Groups trades by an ordered key; trades whose key is `None` are left out.
fn group_by<K, F, L>(trades: &[Trade], key_of: F, label: L) -> Vec<Breakdown>
where
    K: Ord,
    F: Fn(&Trade) -> Option<K>,
    L: Fn(&K) -> String,
{
    let mut groups: BTreeMap<K, Tally> = BTreeMap::new();
    for trade in trades {
        if let Some(key) = key_of(trade) {
            groups.entry(key).or_default().add(trade);
        }
    }
    groups
        .into_iter()
        .map(|(key, tally)| tally.into_breakdown(label(&key)))
        .collect()
}

/// Close reasons, most frequent first.
fn by_reason(trades: &[Trade]) -> Vec<Breakdown> {
    let mut rows = group_by(trades, |t| Some(t.close.reason.clone()), String::clone);
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    rows
}

/// Signal and filter activity, independent of whether trades followed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalStats {
    pub total_signals: usize,
    pub signals_traded: usize,
    pub direction_conflicts: usize,
    pub filter_blocks: usize,
    /// Most frequent first.
    pub blocks_by_filter: Vec<(String, usize)>,
    pub blocks_per_trade: Option<f64>,
}

impl SignalStats {
    pub fn compute(events: &[Event], trades: &[Trade]) -> Self {
        let mut total_signals = 0;
        let mut direction_conflicts = 0;
        let mut filter_blocks = 0;
        let mut per_filter: BTreeMap<&str, usize> = BTreeMap::new();

        for event in events {
            match event {
                Event::Signal(s) => {
                    total_signals += 1;
                    if s.is_direction_conflict() {
                        direction_conflicts += 1;
                    }
                }
                Event::FilterBlock(b) => {
                    filter_blocks += 1;
                    *per_filter.entry(b.filter_name.as_str()).or_default() += 1;
                }
                _ => {}
            }
        }

        let signals_traded = trades
            .iter()
            .filter_map(|t| t.signal.as_ref().map(|s| s.line))
            .collect::<BTreeSet<_>>()
            .len();

        let mut blocks_by_filter: Vec<(String, usize)> = per_filter
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        blocks_by_filter.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        SignalStats {
            total_signals,
            signals_traded,
            direction_conflicts,
            filter_blocks,
            blocks_by_filter,
            blocks_per_trade: (!trades.is_empty())
                .then(|| filter_blocks as f64 / trades.len() as f64),
        }
    }
}
